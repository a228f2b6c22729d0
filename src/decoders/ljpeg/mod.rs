use byteorder::{BigEndian, ByteOrder};

use crate::decoders::basics::*;

mod huffman;
use self::huffman::HuffTable;

#[derive(Debug, Copy, Clone)]
struct JpegComponent {
  id: u8,
  super_h: usize,
  super_v: usize,
  dc_table: usize,
}

/// Lossless JPEG (SOF3) decompressor for one compressed strip. Creating one
/// only parses the markers up to SOS, so it doubles as the cheap frame
/// header probe the slice locator needs.
pub struct LjpegDecompressor<'a> {
  buffer: &'a [u8],
  width: usize,
  height: usize,
  precision: usize,
  point_transform: usize,
  components: Vec<JpegComponent>,
  dhts: Vec<Option<HuffTable>>,
  scan_offset: usize,
}

impl<'a> LjpegDecompressor<'a> {
  pub fn new(src: &'a [u8]) -> Result<LjpegDecompressor<'a>, String> {
    if src.len() < 4 || src[0] != 0xff || src[1] != 0xd8 {
      return Err("ljpeg: stream doesn't start with SOI".to_string())
    }

    let mut width = 0;
    let mut height = 0;
    let mut precision = 0;
    let mut predictor = 0;
    let mut point_transform = 0;
    let mut components: Vec<JpegComponent> = Vec::new();
    let mut dhts: Vec<Option<HuffTable>> = vec![None, None, None, None];
    let mut scan_offset = 0;

    let mut pos = 2;
    loop {
      if pos + 4 > src.len() {
        return Err("ljpeg: reached the end of the stream before SOS".to_string())
      }
      if src[pos] != 0xff {
        return Err("ljpeg: expected a marker".to_string())
      }
      let marker = src[pos + 1];
      if marker == 0xff {
        pos += 1; // fill byte
        continue;
      }
      let len = BigEndian::read_u16(&src[pos + 2..pos + 4]) as usize;
      if len < 2 || pos + 2 + len > src.len() {
        return Err("ljpeg: segment length out of bounds".to_string())
      }
      let data = &src[pos + 4..pos + 2 + len];
      match marker {
        0xc3 => {
          // SOF3, the only frame type we handle
          if data.len() < 6 {
            return Err("ljpeg: SOF too short".to_string())
          }
          precision = data[0] as usize;
          height = BigEndian::read_u16(&data[1..3]) as usize;
          width = BigEndian::read_u16(&data[3..5]) as usize;
          let cps = data[5] as usize;
          if cps < 1 || cps > 4 {
            return Err(format!("ljpeg: unsupported component count {}", cps))
          }
          if data.len() < 6 + cps * 3 {
            return Err("ljpeg: SOF too short".to_string())
          }
          for i in 0..cps {
            let id = data[6 + i * 3];
            let hv = data[7 + i * 3];
            components.push(JpegComponent {
              id,
              super_h: (hv >> 4) as usize,
              super_v: (hv & 0xf) as usize,
              dc_table: 0,
            });
          }
        }
        0xc4 => {
          let mut dpos = 0;
          while dpos + 17 <= data.len() {
            let class = data[dpos] >> 4;
            let id = (data[dpos] & 0xf) as usize;
            if class != 0 || id > 3 {
              return Err("ljpeg: only DC huffman tables make sense here".to_string())
            }
            let mut bits = [0usize; 17];
            let mut total = 0;
            for l in 1..17 {
              bits[l] = data[dpos + l] as usize;
              total += bits[l];
            }
            if dpos + 17 + total > data.len() {
              return Err("ljpeg: DHT table out of bounds".to_string())
            }
            let huffval = data[dpos + 17..dpos + 17 + total].to_vec();
            dhts[id] = Some(HuffTable::new(&bits, huffval)?);
            dpos += 17 + total;
          }
        }
        0xda => {
          if components.is_empty() {
            return Err("ljpeg: SOS before SOF".to_string())
          }
          let ns = data[0] as usize;
          if ns != components.len() || data.len() < 1 + ns * 2 + 3 {
            return Err("ljpeg: SOS doesn't match the frame".to_string())
          }
          for i in 0..ns {
            let id = data[1 + i * 2];
            let table = (data[2 + i * 2] >> 4) as usize;
            match components.iter_mut().find(|c| c.id == id) {
              Some(comp) => comp.dc_table = table,
              None => return Err("ljpeg: SOS references unknown component".to_string()),
            }
          }
          predictor = data[1 + ns * 2] as usize;
          point_transform = (data[3 + ns * 2] & 0xf) as usize;
          scan_offset = pos + 2 + len;
        }
        0xc0..=0xc2 | 0xc5..=0xc7 | 0xc9..=0xcb | 0xcd..=0xcf => {
          return Err("ljpeg: not a lossless jpeg stream".to_string())
        }
        0xd9 => {
          return Err("ljpeg: reached EOI before SOS".to_string())
        }
        _ => {} // APPn and friends, skip
      }
      pos += 2 + len;
      if scan_offset != 0 {
        break;
      }
    }

    if width == 0 || height == 0 {
      return Err("ljpeg: zero sized frame".to_string())
    }
    if precision < 2 || precision > 16 || point_transform >= precision {
      return Err(format!("ljpeg: unsupported precision {}", precision))
    }
    if predictor != 1 {
      return Err(format!("ljpeg: unsupported predictor {}", predictor))
    }
    for comp in &components {
      if dhts[comp.dc_table].is_none() {
        return Err("ljpeg: scan references a missing huffman table".to_string())
      }
    }

    Ok(LjpegDecompressor {
      buffer: src,
      width,
      height,
      precision,
      point_transform,
      components,
      dhts,
      scan_offset,
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn components(&self) -> usize {
    self.components.len()
  }

  pub fn super_h(&self) -> usize {
    self.components[0].super_h
  }

  pub fn super_v(&self) -> usize {
    self.components[0].super_v
  }

  fn table(&self, idx: usize) -> Result<&HuffTable, String> {
    self.dhts[idx].as_ref().ok_or_else(|| "ljpeg: missing huffman table".to_string())
  }

  /// Decode the strip into `out`, which is laid out as vertical bands of
  /// `slice_widths` samples, each spanning the full `out_height`. `off_y` is
  /// the band space offset the assembler accumulated for this strip.
  pub fn decode(&self, out: &mut [u16], out_width: usize, out_height: usize,
                slice_widths: &[usize], off_y: usize) -> Result<(), String> {
    for comp in self.components.iter().skip(1) {
      if comp.super_h != 1 || comp.super_v != 1 {
        return Err("ljpeg: subsampled chroma components only".to_string())
      }
    }
    let map = SliceMap::new(slice_widths, out_width, out_height);
    let skip = off_y * self.height;
    let mut pump = BitPumpJPEG::new(&self.buffer[self.scan_offset..]);

    let cps = self.components.len();
    let fit = match (cps, self.super_h(), self.super_v()) {
      (3, 2, 1) => self.decode_422(&mut pump, out, &map, skip)?,
      (3, 2, 2) => self.decode_420(&mut pump, out, &map, skip)?,
      (_, 1, 1) => self.decode_interleaved(&mut pump, out, &map, skip)?,
      (_, h, v) => return Err(format!("ljpeg: unsupported subsampling {}x{}", h, v)),
    };
    if !fit {
      return Err("ljpeg: strip decodes past the end of the image".to_string())
    }
    if pump.is_exhausted() {
      return Err("IO: ljpeg strip ends before all samples are decoded".to_string())
    }
    Ok(())
  }

  fn sample(&self, value: i32) -> u16 {
    ((value << self.point_transform) & 0xffff) as u16
  }

  fn decode_interleaved(&self, pump: &mut BitPumpJPEG, out: &mut [u16],
                        map: &SliceMap, skip: usize) -> Result<bool, String> {
    let cps = self.components.len();
    let mut tables = Vec::with_capacity(cps);
    for comp in &self.components {
      tables.push(self.table(comp.dc_table)?);
    }
    let row_samples = self.width * cps;
    let init = 1i32 << (self.precision - self.point_transform - 1);
    let mut row_start = vec![init; cps];
    let mut fit = true;
    for row in 0..self.height {
      let mut pred = row_start.clone();
      for col in 0..self.width {
        for c in 0..cps {
          pred[c] += tables[c].decode(pump)?;
          if col == 0 {
            row_start[c] = pred[c];
          }
          fit &= map.put(out, skip + row * row_samples + col * cps + c, self.sample(pred[c]));
        }
      }
    }
    Ok(fit)
  }

  // sRaw 4:2:2: each MCU holds Y1 Y2 Cb Cr and expands to two pixel triples
  // sharing the chroma
  fn decode_422(&self, pump: &mut BitPumpJPEG, out: &mut [u16],
                map: &SliceMap, skip: usize) -> Result<bool, String> {
    let ty = self.table(self.components[0].dc_table)?;
    let tcb = self.table(self.components[1].dc_table)?;
    let tcr = self.table(self.components[2].dc_table)?;
    let mcus = self.width / 2;
    let row_samples = self.width * 3;
    let init = 1i32 << (self.precision - self.point_transform - 1);
    let mut row_start = [init, init, init];
    let mut fit = true;
    for row in 0..self.height {
      let mut pred = row_start;
      for mcu in 0..mcus {
        pred[0] += ty.decode(pump)?;
        let y1 = pred[0];
        pred[0] += ty.decode(pump)?;
        let y2 = pred[0];
        pred[1] += tcb.decode(pump)?;
        pred[2] += tcr.decode(pump)?;
        if mcu == 0 {
          row_start = [y1, pred[1], pred[2]];
        }
        let base = skip + row * row_samples + mcu * 6;
        fit &= map.put(out, base, self.sample(y1));
        fit &= map.put(out, base + 1, self.sample(pred[1]));
        fit &= map.put(out, base + 2, self.sample(pred[2]));
        fit &= map.put(out, base + 3, self.sample(y2));
        fit &= map.put(out, base + 4, self.sample(pred[1]));
        fit &= map.put(out, base + 5, self.sample(pred[2]));
      }
    }
    Ok(fit)
  }

  // sRaw 4:2:0: Y1..Y4 cover a 2x2 pixel block, the chroma pair is shared
  // across both rows
  fn decode_420(&self, pump: &mut BitPumpJPEG, out: &mut [u16],
                map: &SliceMap, skip: usize) -> Result<bool, String> {
    let ty = self.table(self.components[0].dc_table)?;
    let tcb = self.table(self.components[1].dc_table)?;
    let tcr = self.table(self.components[2].dc_table)?;
    let mcus = self.width / 2;
    let mcu_rows = self.height / 2;
    let row_samples = self.width * 3;
    let init = 1i32 << (self.precision - self.point_transform - 1);
    let mut row_start = [init, init, init];
    let mut fit = true;
    for mrow in 0..mcu_rows {
      let mut pred = row_start;
      for mcu in 0..mcus {
        pred[0] += ty.decode(pump)?;
        let y1 = pred[0];
        pred[0] += ty.decode(pump)?;
        let y2 = pred[0];
        pred[0] += ty.decode(pump)?;
        let y3 = pred[0];
        pred[0] += ty.decode(pump)?;
        let y4 = pred[0];
        pred[1] += tcb.decode(pump)?;
        pred[2] += tcr.decode(pump)?;
        if mcu == 0 {
          row_start = [y1, pred[1], pred[2]];
        }
        let top = skip + mrow * 2 * row_samples + mcu * 6;
        let bottom = top + row_samples;
        fit &= map.put(out, top, self.sample(y1));
        fit &= map.put(out, top + 1, self.sample(pred[1]));
        fit &= map.put(out, top + 2, self.sample(pred[2]));
        fit &= map.put(out, top + 3, self.sample(y2));
        fit &= map.put(out, top + 4, self.sample(pred[1]));
        fit &= map.put(out, top + 5, self.sample(pred[2]));
        fit &= map.put(out, bottom, self.sample(y3));
        fit &= map.put(out, bottom + 1, self.sample(pred[1]));
        fit &= map.put(out, bottom + 2, self.sample(pred[2]));
        fit &= map.put(out, bottom + 3, self.sample(y4));
        fit &= map.put(out, bottom + 4, self.sample(pred[1]));
        fit &= map.put(out, bottom + 5, self.sample(pred[2]));
      }
    }
    Ok(fit)
  }
}

/// Maps a running sample index onto the sliced output layout: the image is a
/// sequence of vertical bands, each filled top to bottom before the next one
/// starts
struct SliceMap {
  bands: Vec<(usize, usize, usize)>, // first sample, start column, width
  out_width: usize,
  total: usize,
}

impl SliceMap {
  fn new(slice_widths: &[usize], out_width: usize, out_height: usize) -> SliceMap {
    let mut bands = Vec::new();
    let mut col = 0;
    let mut cum = 0;
    for &w in slice_widths {
      if w == 0 {
        continue;
      }
      bands.push((cum, col, w));
      col += w;
      cum += w * out_height;
    }
    SliceMap { bands, out_width, total: cum }
  }

  fn put(&self, out: &mut [u16], sample: usize, value: u16) -> bool {
    if sample >= self.total {
      return false;
    }
    for &(cum, col, w) in self.bands.iter().rev() {
      if sample >= cum {
        let local = sample - cum;
        let idx = (local / w) * self.out_width + col + local % w;
        if idx < out.len() {
          out[idx] = value;
          return true;
        }
        return false;
      }
    }
    false
  }
}

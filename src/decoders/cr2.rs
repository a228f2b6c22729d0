use std::f32::NAN;
use std::mem;

use byteorder::{BigEndian, ByteOrder};
use itertools::izip;
use rayon::prelude::*;

use crate::decoders::*;
use crate::decoders::basics::*;
use crate::decoders::ljpeg::*;
use crate::decoders::tiff::*;

// for the gory details of the sliced CR2 layout see http://lclevy.free.fr/cr2/

#[derive(Debug, Clone)]
pub struct Cr2Decoder<'a> {
  buffer: &'a Buffer,
  rawcanon: &'a RawCanon,
  tiff: TiffIFD<'a>,
}

#[derive(Debug, Copy, Clone)]
struct Cr2Slice {
  w: usize,
  h: usize,
  offset: usize,
  size: usize,
}

/// The camera hints, parsed once instead of being string matched at every
/// decision point
#[derive(Debug, Default, Copy, Clone)]
pub struct Cr2Hints {
  old_format: bool,
  double_line_ljpeg: bool,
  sraw_40d: bool,
  sraw_new: bool,
  invert_sraw_wb: bool,
  old_sraw_hue: bool,
  force_new_sraw_hue: bool,
  wb_offset: Option<usize>,
}

impl Cr2Hints {
  fn new(camera: &Camera) -> Cr2Hints {
    Cr2Hints {
      old_format: camera.find_hint("old_format"),
      double_line_ljpeg: camera.find_hint("double_line_ljpeg"),
      sraw_40d: camera.find_hint("sraw_40d"),
      sraw_new: camera.find_hint("sraw_new"),
      invert_sraw_wb: camera.find_hint("invert_sraw_wb"),
      old_sraw_hue: camera.find_hint("old_sraw_hue"),
      force_new_sraw_hue: camera.find_hint("force_new_sraw_hue"),
      wb_offset: camera.wb_offset,
    }
  }
}

impl<'a> Cr2Decoder<'a> {
  pub fn new(buf: &'a Buffer, tiff: TiffIFD<'a>, rawcanon: &'a RawCanon) -> Cr2Decoder<'a> {
    Cr2Decoder {
      buffer: buf,
      tiff,
      rawcanon,
    }
  }
}

impl<'a> Decoder for Cr2Decoder<'a> {
  fn identify(&self) -> Result<&Camera, String> {
    let ifd = fetch_ifd!(self.tiff, Tag::Model);
    let make = fetch_tag!(ifd, Tag::Make, "CR2: Couldn't find Make").get_str();
    let model = fetch_tag!(ifd, Tag::Model, "CR2: Couldn't find Model").get_str();
    let mode = if self.is_sraw() { "sraw1" } else { "" };
    self.rawcanon.check_supported_with_everything(&make, &model, mode)
  }

  fn image(&self) -> Result<RawImage, String> {
    self.image_internal(false)
  }

  fn image_uncorrected(&self) -> Result<RawImage, String> {
    self.image_internal(true)
  }
}

impl<'a> Cr2Decoder<'a> {
  fn image_internal(&self, uncorrected: bool) -> Result<RawImage, String> {
    let camera = self.identify()?;
    let hints = Cr2Hints::new(camera);
    let mut img = if hints.old_format {
      self.decode_old_format(camera, &hints, uncorrected)?
    } else {
      self.decode_new_format(camera, &hints)?
    };
    // the whitebalance is best effort, a miss is recorded and not raised
    match self.get_wb(&hints) {
      Ok(wb) => img.wb_coeffs = wb,
      Err(e) => img.set_error(&e),
    }
    Ok(img)
  }

  fn is_sraw(&self) -> bool {
    self.tiff.find_ifds_with_tag(Tag::Cr2Id)
        .first()
        .and_then(|ifd| ifd.find_entry(Tag::Cr2SRawMode))
        .map(|entry| entry.get_u32(0) == 4)
        .unwrap_or(false)
  }

  /// The single strip format of the early 1D bodies: one LJPEG stream
  /// pointed at by tag 0x81, with the real dimensions 41 bytes in
  fn decode_old_format(&self, camera: &Camera, hints: &Cr2Hints,
                       uncorrected: bool) -> Result<RawImage, String> {
    let buf = &self.buffer.buf;
    let off = if let Some(entry) = self.tiff.find_entry_recursive(Tag::Cr2OldOffset) {
      entry.get_usize(0)
    } else {
      let data = self.tiff.find_ifds_with_tag(Tag::CFAPattern);
      match data.first().and_then(|ifd| ifd.find_entry(Tag::StripOffsets)) {
        Some(entry) => entry.get_usize(0),
        None => return Err("CR2: Couldn't find raw offset".to_string()),
      }
    };
    if off + 45 > self.buffer.size {
      return Err("CR2: Raw offset out of bounds".to_string())
    }
    let height = BigEndian::read_u16(&buf[off + 41..off + 43]) as usize;
    let width = BigEndian::read_u16(&buf[off + 43..off + 45]) as usize;
    if width == 0 || height == 0 {
      return Err("CR2: Raw frame is zero sized".to_string())
    }

    // Every two lines can be encoded as one double width line, probably to
    // get the same RGGB sequence in every encoded line
    let (frame_width, frame_height, width, height) = if hints.double_line_ljpeg {
      (width * 2, height, width, height * 2)
    } else {
      (width * 2, height, width * 2, height)
    };

    let mut data = vec![0u16; frame_width * frame_height];
    let mut errors = Vec::new();
    let decompressor = LjpegDecompressor::new(&buf[off..self.buffer.size])?;
    if let Err(e) = decompressor.decode(&mut data, frame_width, frame_height,
                                        &[frame_width], 0) {
      if e.starts_with("IO:") {
        // probably truncated, the lines decoded so far are still good
        errors.push(e);
      } else {
        return Err(e)
      }
    }

    if hints.double_line_ljpeg {
      // unfold the double width lines back into consecutive rows
      let mut unfolded = vec![0u16; width * height];
      for y in 0..height {
        let src_off = (y / 2) * frame_width + if y % 2 == 0 { 0 } else { width };
        unfolded[y * width..(y + 1) * width]
          .copy_from_slice(&data[src_off..src_off + width]);
      }
      data = unfolded;
    }

    let mut linearization = None;
    if let Some(curve) = self.tiff.find_entry_recursive(Tag::GrayResponse) {
      if curve.typ() == 3 && curve.count() == 4096 {
        let table: Vec<u16> = (0..4096).map(|i| curve.get_u16(i)).collect();
        let lookup = LookupTable::new(&table);
        if uncorrected {
          // leave the samples alone and hand the curve to the caller
          linearization = Some(lookup);
        } else {
          for sample in data.iter_mut() {
            *sample = lookup.lookup(*sample);
          }
        }
      }
    }

    let mut img = ok_image(camera, width, height, [NAN, NAN, NAN, NAN], data)?;
    img.linearization = linearization;
    img.errors = errors;
    Ok(img)
  }

  /// The sliced format: the 4th IFD holds the strip table, every strip is an
  /// independent LJPEG stream and they all have to agree on their width
  fn decode_new_format(&self, camera: &Camera, hints: &Cr2Hints) -> Result<RawImage, String> {
    let buf = &self.buffer.buf;
    if self.tiff.sub_ifds().len() < 4 {
      return Err("CR2: Couldn't find the raw IFD".to_string())
    }
    let raw = &self.tiff.sub_ifds()[3];
    let offsets = fetch_tag!(raw, Tag::StripOffsets, "CR2: Couldn't find strip offsets");
    let counts = fetch_tag!(raw, Tag::StripByteCounts, "CR2: Couldn't find strip counts");
    if offsets.count() != counts.count() {
      return Err("CR2: Strip offsets and byte counts don't match".to_string())
    }
    let strip_offsets: Vec<usize> = (0..offsets.count()).map(|i| offsets.get_usize(i)).collect();
    let strip_counts: Vec<usize> = (0..counts.count()).map(|i| counts.get_usize(i)).collect();

    let mut slices: Vec<Cr2Slice> = Vec::new();
    let mut complete_h = 0;
    let mut subsampling = (1, 1);
    for (offset, size) in izip!(strip_offsets, strip_counts) {
      if !self.buffer.valid_range(offset, size) {
        continue; // damaged strip table entry, drop the strip
      }
      // only the frame header gets parsed here, no pixels yet
      let ljpeg = LjpegDecompressor::new(&buf[offset..offset + size])?;
      let (width, height) = correct_frame_size(ljpeg.width(), ljpeg.height(),
                                               ljpeg.components());
      let slice = Cr2Slice { w: width * ljpeg.components(), h: height, offset, size };
      if let Some(first) = slices.first() {
        if first.w != slice.w {
          return Err("CR2: Slice width does not match".to_string())
        }
      }
      subsampling = (ljpeg.super_h(), ljpeg.super_v());
      complete_h += slice.h;
      slices.push(slice);
    }
    if slices.is_empty() {
      return Err("CR2: No slices found".to_string())
    }

    let mut width = slices[0].w;
    let mut height = complete_h;
    let mut cpp = 1;
    let mut is_cfa = true;
    if let Some(mode) = raw.find_entry(Tag::Cr2SRawMode) {
      if mode.get_u32(0) == 4 {
        // sRaw, the samples are packed YCbCr triples
        width /= 3;
        cpp = 3;
        is_cfa = false;
        // Some mRaw files (80D) disagree between the ljpeg frame size and
        // the image size tags, the pixel counts have to match though
        if raw.has_entry(Tag::ImageWidth) && raw.has_entry(Tag::ImageLength) {
          let w = fetch_tag!(raw, Tag::ImageWidth).get_usize(0);
          let h = fetch_tag!(raw, Tag::ImageLength).get_usize(0);
          if w * h != width * height {
            return Err("CR2: Wrapped slices don't match the image size".to_string())
          }
          width = w;
          height = h;
        }
      }
      // The 6D writes flipped width and height for part of the image
      if width < height {
        mem::swap(&mut width, &mut height);
      }
    }

    // allocated exactly once, every pass after this works in place
    let mut data = vec![0u16; width * height * cpp];

    let s_width = if let Some(entry) = raw.find_entry(Tag::CanonCr2Slice) {
      let n = entry.get_u16(0) as usize;
      let mut widths = Vec::with_capacity(n + 1);
      for _ in 0..n {
        widths.push(entry.get_u16(1) as usize);
      }
      widths.push(entry.get_u16(2) as usize);
      widths
    } else {
      vec![slices[0].w]
    };

    let mut errors = Vec::new();
    let mut off_y = 0;
    for (i, slice) in slices.iter().enumerate() {
      let result = LjpegDecompressor::new(&buf[slice.offset..slice.offset + slice.size])
        .and_then(|d| d.decode(&mut data, width * cpp, height, &s_width, off_y));
      if let Err(e) = result {
        if i == 0 {
          // without the first strip there is no image worth returning
          return Err(e)
        }
        // may be a single broken slice, keep the rest of the image
        errors.push(e);
      }
      // strips advance through the sliced layout by their own width
      off_y += slice.w;
    }

    let mut img = RawImage {
      make: camera.make.clone(),
      model: camera.model.clone(),
      width,
      height,
      cpp,
      wb_coeffs: [NAN, NAN, NAN, NAN],
      data,
      is_cfa,
      cfa: "RGGB".to_string(),
      subsampling,
      linearization: None,
      errors,
    };
    if subsampling.0 > 1 || subsampling.1 > 1 {
      if cpp != 3 {
        // a subsampled frame outside of sraw mode is no layout we know
        return Err("CR2: Subsampled image that is not sRaw".to_string())
      }
      self.sraw_interpolate(&mut img, hints)?;
    }
    Ok(img)
  }

  fn get_wb(&self, hints: &Cr2Hints) -> Result<[f32; 4], String> {
    if let Some(wb) = self.tiff.find_entry_recursive(Tag::CanonColorData) {
      // a big table where different cameras store the whitebalance at
      // different spots, 126 is by far the most common one
      let offset = hints.wb_offset.unwrap_or(126) / 2;
      if wb.count() < offset + 4 {
        return Err("CR2: Color data too short for the whitebalance".to_string())
      }
      return Ok([wb.get_u16(offset) as f32,
                 wb.get_u16(offset + 1) as f32,
                 wb.get_u16(offset + 3) as f32,
                 NAN])
    }
    if let (Some(shot_info), Some(g9_wb)) =
        (self.tiff.find_entry_recursive(Tag::CanonShotInfo),
         self.tiff.find_entry_recursive(Tag::CanonPowerShotG9WB)) {
      let wb_index = shot_info.get_u16(7) as usize;
      let offsets = b"012347800000005896";
      let wb_offset = if wb_index < 18 { (offsets[wb_index] - b'0') as usize } else { 0 };
      let wb_offset = wb_offset * 8 + 2;
      if g9_wb.count() < wb_offset + 4 {
        return Err("CR2: G9 whitebalance table too short".to_string())
      }
      return Ok([g9_wb.get_u32(wb_offset + 1) as f32,
                 (g9_wb.get_u32(wb_offset) as f32 + g9_wb.get_u32(wb_offset + 3) as f32) / 2.0,
                 g9_wb.get_u32(wb_offset + 2) as f32,
                 NAN])
    }
    if let Some(wb) = self.tiff.find_entry_recursive(Tag::Cr2OldWB) {
      // the 1D and 1DS store plain RGB factors
      if wb.count() >= 3 {
        return Ok([wb.get_f32(0), wb.get_f32(1), wb.get_f32(2), NAN])
      }
    }
    Ok([NAN, NAN, NAN, NAN])
  }

  fn get_hue(&self, hints: &Cr2Hints, subsampling: (usize, usize)) -> i32 {
    let model_id = self.tiff.find_entry_recursive(Tag::CanonModelId)
                            .map(|entry| entry.get_u32(0));
    hue_bias(model_id, hints, subsampling)
  }

  /// Convert the subsampled YCbCr back to full resolution RGB in place
  fn sraw_interpolate(&self, img: &mut RawImage, hints: &Cr2Hints) -> Result<(), String> {
    let data = self.tiff.find_ifds_with_tag(Tag::CanonColorData);
    let ifd = match data.first() {
      Some(ifd) => *ifd,
      None => return Err("CR2: Unable to locate the sRaw whitebalance".to_string()),
    };
    let wb = fetch_tag!(ifd, Tag::CanonColorData);
    // reconstruction coefficients, not the same spot as the metadata wb
    let offset = 78;
    let mut coeffs = [wb.get_u16(offset) as i32,
                      (wb.get_u16(offset + 1) as i32 + wb.get_u16(offset + 2) as i32 + 1) >> 1,
                      wb.get_u16(offset + 3) as i32];
    if hints.invert_sraw_wb {
      coeffs[0] = (1024.0 / (coeffs[0] as f32 / 1024.0)) as i32;
      coeffs[2] = (1024.0 / (coeffs[2] as f32 / 1024.0)) as i32;
    }

    // computed once, the same bias applies to every chroma sample
    let hue = -self.get_hue(hints, img.subsampling) + 16384;
    match img.subsampling {
      (2, 1) => {
        let variant = if hints.sraw_40d {
          YuvConversion::Old40d
        } else if hints.sraw_new {
          YuvConversion::New
        } else {
          YuvConversion::Standard
        };
        interpolate_422(&mut img.data, img.width, coeffs, hue, variant);
      }
      (2, 2) => {
        let variant = if hints.sraw_new { YuvConversion::New } else { YuvConversion::Standard };
        interpolate_420(&mut img.data, img.width, img.height, coeffs, hue, variant);
      }
      (x, y) => return Err(format!("CR2: Unknown subsampling {}x{}", x, y)),
    }
    Ok(())
  }
}

/// Some frame headers (5Ds) lie about their orientation: four components and
/// wider than tall means the width was doubled and the height halved
fn correct_frame_size(width: usize, height: usize, cps: usize) -> (usize, usize) {
  if cps == 4 && width > height {
    (width / 2, height * 2)
  } else {
    (width, height)
  }
}

/// The chroma zero point moved between sensor generations. 0x80000281 is the
/// first model id of the new convention, 0x80000218 got it early.
fn hue_bias(model_id: Option<u32>, hints: &Cr2Hints, subsampling: (usize, usize)) -> i32 {
  let full = (subsampling.0 * subsampling.1) as i32;
  if hints.old_sraw_hue {
    return full;
  }
  let model_id = match model_id {
    Some(id) => id,
    None => return 0,
  };
  if model_id >= 0x80000281 || model_id == 0x80000218 || hints.force_new_sraw_hue {
    (full - 1) >> 1
  } else {
    full
  }
}

/// Which of the fixed point YCbCr to RGB formulas applies. They only differ
/// in the matrix constants and whether a 512 offset is subtracted.
#[derive(Debug, Copy, Clone, PartialEq)]
enum YuvConversion {
  Standard,
  Old40d,
  New,
}

fn yuv_to_rgb(coeffs: [i32; 3], variant: YuvConversion, y: i32, cb: i32, cr: i32) -> (u16, u16, u16) {
  let (r, g, b) = match variant {
    YuvConversion::Standard => (
      coeffs[0] * (y + ((50 * cb + 22929 * cr) >> 12)),
      coeffs[1] * (y + ((-5640 * cb - 11751 * cr) >> 12)),
      coeffs[2] * (y + ((29040 * cb - 101 * cr) >> 12)),
    ),
    YuvConversion::Old40d => (
      coeffs[0] * (y + cr - 512),
      coeffs[1] * (y + ((-778 * cb - (cr << 11)) >> 12) - 512),
      coeffs[2] * (y + cb - 512),
    ),
    YuvConversion::New => (
      coeffs[0] * (y + cr),
      coeffs[1] * (y + ((-778 * cb - (cr << 11)) >> 12)),
      coeffs[2] * (y + cb),
    ),
  };
  (clampbits(r >> 8, 16), clampbits(g >> 8, 16), clampbits(b >> 8, 16))
}

fn set_rgb(line: &mut [u16], off: usize, rgb: (u16, u16, u16)) {
  line[off] = rgb.0;
  line[off + 1] = rgb.1;
  line[off + 2] = rgb.2;
}

/// 4:2:2: rows are fully independent, so they fan out across the thread pool
fn interpolate_422(data: &mut [u16], width: usize, coeffs: [i32; 3], hue: i32,
                   variant: YuvConversion) {
  if width < 2 {
    return;
  }
  let row_len = width * 3;
  data.par_chunks_mut(row_len).for_each(|row| {
    interpolate_422_row(row, width, coeffs, hue, variant);
  });
}

fn interpolate_422_row(row: &mut [u16], width: usize, coeffs: [i32; 3], hue: i32,
                       variant: YuvConversion) {
  // every pair but the last interpolates towards its right neighbour
  let pairs = width / 2 - 1;
  let mut off = 0;
  for _ in 0..pairs {
    let y = row[off] as i32;
    let cb = row[off + 1] as i32 - hue;
    let cr = row[off + 2] as i32 - hue;
    set_rgb(row, off, yuv_to_rgb(coeffs, variant, y, cb, cr));
    off += 3;

    let y = row[off] as i32;
    let cb2 = (cb + row[off + 1 + 3] as i32 - hue) >> 1;
    let cr2 = (cr + row[off + 2 + 3] as i32 - hue) >> 1;
    set_rgb(row, off, yuv_to_rgb(coeffs, variant, y, cb2, cr2));
    off += 3;
  }
  // the last two pixels reuse the final chroma as is; the 40d and new style
  // conversions keep the raw bias here instead of the hue adjusted one
  let bias = match variant {
    YuvConversion::Standard => hue,
    _ => 16384,
  };
  let y = row[off] as i32;
  let cb = row[off + 1] as i32 - bias;
  let cr = row[off + 2] as i32 - bias;
  set_rgb(row, off, yuv_to_rgb(coeffs, variant, y, cb, cr));
  let y = row[off + 3] as i32;
  set_rgb(row, off + 3, yuv_to_rgb(coeffs, variant, y, cb, cr));
}

/// 4:2:0: rows y*2 and y*2+1 are written while row y*2+2 is read, so this
/// one stays single threaded and the last row pair is handled on its own
fn interpolate_420(data: &mut [u16], width: usize, height: usize, coeffs: [i32; 3],
                   hue: i32, variant: YuvConversion) {
  if width < 2 || height < 2 {
    return;
  }
  let row_len = width * 3;
  let pairs = width / 2 - 1;
  let row_pairs = height / 2;
  for y in 0..row_pairs - 1 {
    let base = y * 2 * row_len;
    let (c_line, rest) = data[base..base + 3 * row_len].split_at_mut(row_len);
    let (n_line, nn_line) = rest.split_at_mut(row_len);
    interpolate_420_rows(c_line, n_line, Some(nn_line), pairs, coeffs, hue, variant);
  }
  let base = (row_pairs - 1) * 2 * row_len;
  let (c_line, n_line) = data[base..base + 2 * row_len].split_at_mut(row_len);
  interpolate_420_rows(c_line, n_line, None, pairs, coeffs, hue, variant);
}

fn interpolate_420_rows(c_line: &mut [u16], n_line: &mut [u16], nn_line: Option<&[u16]>,
                        pairs: usize, coeffs: [i32; 3], hue: i32, variant: YuvConversion) {
  match nn_line {
    Some(nn_line) => {
      let mut off = 0;
      for _ in 0..pairs {
        let y = c_line[off] as i32;
        let cb = c_line[off + 1] as i32 - hue;
        let cr = c_line[off + 2] as i32 - hue;
        set_rgb(c_line, off, yuv_to_rgb(coeffs, variant, y, cb, cr));

        let y = c_line[off + 3] as i32;
        let cb2 = (cb + c_line[off + 1 + 6] as i32 - hue) >> 1;
        let cr2 = (cr + c_line[off + 2 + 6] as i32 - hue) >> 1;
        set_rgb(c_line, off + 3, yuv_to_rgb(coeffs, variant, y, cb2, cr2));

        let y = n_line[off] as i32;
        let cb3 = (cb + nn_line[off + 1] as i32 - hue) >> 1;
        let cr3 = (cr + nn_line[off + 2] as i32 - hue) >> 1;
        set_rgb(n_line, off, yuv_to_rgb(coeffs, variant, y, cb3, cr3));

        let y = n_line[off + 3] as i32;
        // left + above + right + below
        let cb4 = (cb + cb2 + cb3 + nn_line[off + 1 + 6] as i32 - hue) >> 2;
        let cr4 = (cr + cr2 + cr3 + nn_line[off + 2 + 6] as i32 - hue) >> 2;
        set_rgb(n_line, off + 3, yuv_to_rgb(coeffs, variant, y, cb4, cr4));
        off += 6;
      }
      let y = c_line[off] as i32;
      let cb = c_line[off + 1] as i32 - hue;
      let cr = c_line[off + 2] as i32 - hue;
      set_rgb(c_line, off, yuv_to_rgb(coeffs, variant, y, cb, cr));
      let y = c_line[off + 3] as i32;
      set_rgb(c_line, off + 3, yuv_to_rgb(coeffs, variant, y, cb, cr));

      let y = n_line[off] as i32;
      let cb = (cb + nn_line[off + 1] as i32 - hue) >> 1;
      let cr = (cr + nn_line[off + 2] as i32 - hue) >> 1;
      set_rgb(n_line, off, yuv_to_rgb(coeffs, variant, y, cb, cr));
      let y = n_line[off + 3] as i32;
      set_rgb(n_line, off + 3, yuv_to_rgb(coeffs, variant, y, cb, cr));
    }
    None => {
      // Last pair of rows: no row below to borrow chroma from, so both rows
      // reuse the current chroma unchanged, and the final pixel pair stays
      // untouched. That asymmetry is what the format shipped with.
      let mut off = 0;
      for _ in 0..pairs {
        let y = c_line[off] as i32;
        let cb = c_line[off + 1] as i32 - hue;
        let cr = c_line[off + 2] as i32 - hue;
        set_rgb(c_line, off, yuv_to_rgb(coeffs, variant, y, cb, cr));
        let y = c_line[off + 3] as i32;
        set_rgb(c_line, off + 3, yuv_to_rgb(coeffs, variant, y, cb, cr));

        let y = n_line[off] as i32;
        set_rgb(n_line, off, yuv_to_rgb(coeffs, variant, y, cb, cr));
        let y = n_line[off + 3] as i32;
        set_rgb(n_line, off + 3, yuv_to_rgb(coeffs, variant, y, cb, cr));
        off += 6;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_size_correction_only_fires_for_wide_4cps_frames() {
    assert_eq!(correct_frame_size(1440, 1920, 2), (1440, 1920));
    assert_eq!(correct_frame_size(2960, 864, 4), (1480, 1728));
    assert_eq!(correct_frame_size(864, 2960, 4), (864, 2960));
    assert_eq!(correct_frame_size(2960, 864, 3), (2960, 864));
  }

  #[test]
  fn hue_bias_follows_the_model_generation() {
    let hints = Cr2Hints::default();
    // no model id known means no bias at all
    assert_eq!(hue_bias(None, &hints, (2, 2)), 0);
    // old generation keeps the full product
    assert_eq!(hue_bias(Some(0x80000250), &hints, (2, 2)), 4);
    assert_eq!(hue_bias(Some(0x80000250), &hints, (2, 1)), 2);
    // new generation and the one early model halve it
    assert_eq!(hue_bias(Some(0x80000281), &hints, (2, 2)), 1);
    assert_eq!(hue_bias(Some(0x80000285), &hints, (2, 1)), 0);
    assert_eq!(hue_bias(Some(0x80000218), &hints, (2, 2)), 1);
  }

  #[test]
  fn hue_bias_hints_override_the_model_id() {
    let old = Cr2Hints { old_sraw_hue: true, ..Default::default() };
    assert_eq!(hue_bias(Some(0x80000285), &old, (2, 2)), 4);
    let forced = Cr2Hints { force_new_sraw_hue: true, ..Default::default() };
    assert_eq!(hue_bias(Some(0x80000001), &forced, (2, 2)), 1);
  }

  #[test]
  fn hue_bias_is_idempotent() {
    let hints = Cr2Hints::default();
    let first = hue_bias(Some(0x80000285), &hints, (2, 2));
    let second = hue_bias(Some(0x80000285), &hints, (2, 2));
    assert_eq!(first, second);
  }

  #[test]
  fn yuv_conversion_variants() {
    let coeffs = [1024, 1024, 1024];
    // neutral chroma passes the luma through all three channels
    assert_eq!(yuv_to_rgb(coeffs, YuvConversion::Standard, 1000, 0, 0),
               (4000, 4000, 4000));
    assert_eq!(yuv_to_rgb(coeffs, YuvConversion::New, 1000, 0, 0),
               (4000, 4000, 4000));
    // the 40d formula subtracts its fixed 512 offset
    assert_eq!(yuv_to_rgb(coeffs, YuvConversion::Old40d, 1000, 0, 0),
               (1952, 1952, 1952));
    // values clamp into the 16 bit range
    assert_eq!(yuv_to_rgb(coeffs, YuvConversion::New, 40000, 0, 0).0, 65535);
    assert_eq!(yuv_to_rgb(coeffs, YuvConversion::Old40d, 100, 0, 0).0, 0);
  }

  fn triple(y: u16, cb: i32, cr: i32, hue: i32) -> [u16; 3] {
    [y, (cb + hue) as u16, (cr + hue) as u16]
  }

  #[test]
  fn interpolate_422_averages_towards_the_right_neighbour() {
    let coeffs = [1024, 1024, 1024];
    let hue = 16384;
    let variant = YuvConversion::New;
    // 4 pixels: chroma for pixels 1 and 3 comes from interpolation, their
    // stored chroma slots are junk on purpose
    let mut row = Vec::new();
    row.extend(&triple(1000, 100, -50, hue));
    row.extend(&[1100, 9999, 9999]);
    row.extend(&triple(1200, 200, 30, hue));
    row.extend(&[1300, 9999, 9999]);
    interpolate_422_row(&mut row, 4, coeffs, hue, variant);

    let mut expected = Vec::new();
    expected.extend(&rgb3(yuv_to_rgb(coeffs, variant, 1000, 100, -50)));
    expected.extend(&rgb3(yuv_to_rgb(coeffs, variant, 1100, (100 + 200) >> 1, (-50 + 30) >> 1)));
    // the final pair reuses the last chroma without interpolation
    expected.extend(&rgb3(yuv_to_rgb(coeffs, variant, 1200, 200, 30)));
    expected.extend(&rgb3(yuv_to_rgb(coeffs, variant, 1300, 200, 30)));
    assert_eq!(row, expected);
  }

  fn rgb3(rgb: (u16, u16, u16)) -> [u16; 3] {
    [rgb.0, rgb.1, rgb.2]
  }

  #[test]
  fn interpolate_420_last_rows_reuse_chroma() {
    let coeffs = [1024, 1024, 1024];
    let hue = 16384;
    let variant = YuvConversion::Standard;
    // 4x4 pixels, all chroma neutral so every converted pixel turns into
    // plain luma scaled by the coefficients
    let mut data = Vec::new();
    for y in 0..4u16 {
      for x in 0..4u16 {
        data.extend(&triple(1000 + y * 100 + x, 0, 0, hue));
      }
    }
    let raw = data.clone();
    interpolate_420(&mut data, 4, 4, coeffs, hue, variant);

    // rows 0 and 1 are fully converted
    for i in 0..8 {
      let y = raw[i * 3] as i32;
      assert_eq!(&data[i * 3..i * 3 + 3], &rgb3(yuv_to_rgb(coeffs, variant, y, 0, 0)));
    }
    // rows 2 and 3: the first pair converted, the last pair untouched, the
    // way the original decoder leaves it
    for row in 2..4 {
      for x in 0..2 {
        let i = row * 4 + x;
        let y = raw[i * 3] as i32;
        assert_eq!(&data[i * 3..i * 3 + 3], &rgb3(yuv_to_rgb(coeffs, variant, y, 0, 0)));
      }
      for x in 2..4 {
        let i = row * 4 + x;
        assert_eq!(&data[i * 3..i * 3 + 3], &raw[i * 3..i * 3 + 3]);
      }
    }
  }

  #[test]
  fn interpolate_420_neighbour_average_in_the_block() {
    let coeffs = [1024, 1024, 1024];
    let hue = 16384;
    let variant = YuvConversion::New;
    // 4x4 with distinct chroma at the stored positions
    let mut data = Vec::new();
    for y in 0..4u16 {
      for x in 0..4u16 {
        let cb = (y as i32) * 40 + (x as i32) * 10;
        data.extend(&triple(2000 + y * 10 + x, cb, -cb, hue));
      }
    }
    interpolate_420(&mut data, 4, 4, coeffs, hue, variant);
    // bottom right pixel of the first 2x2 block averages left, above, right
    // and below chroma
    let cb = 0i32; // stored chroma of pixel (0,0)
    let cb2 = (cb + 20) >> 1; // towards pixel (0,2)
    let cb3 = (cb + 80) >> 1; // towards pixel (2,0)
    let cb4 = (cb + cb2 + cb3 + 100) >> 2;
    let cr = 0i32;
    let cr2 = (cr + -20) >> 1;
    let cr3 = (cr + -80) >> 1;
    let cr4 = (cr + cr2 + cr3 + -100) >> 2;
    let idx = (1 * 4 + 1) * 3;
    assert_eq!(&data[idx..idx + 3],
               &rgb3(yuv_to_rgb(coeffs, variant, 2011, cb4, cr4)));
  }
}

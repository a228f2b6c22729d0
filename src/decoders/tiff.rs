use std::str;

use crate::decoders::basics::*;

const MAX_CHAIN_DEPTH: usize = 6;

/// The tags the CR2 decoder actually looks at. Canon makernote tags live in
/// the same namespace because makernote IFDs are parsed as plain TIFF IFDs.
#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum Tag {
  CanonShotInfo = 0x0004,
  CanonModelId = 0x0010,
  CanonPowerShotG9WB = 0x0029,
  Cr2OldOffset = 0x0081,
  Cr2OldWB = 0x00a4,
  ImageWidth = 0x0100,
  ImageLength = 0x0101,
  Make = 0x010f,
  Model = 0x0110,
  StripOffsets = 0x0111,
  StripByteCounts = 0x0117,
  GrayResponse = 0x0123,
  SubIFDs = 0x014a,
  CFAPattern = 0x828e,
  ExifIFDPointer = 0x8769,
  Makernote = 0x927c,
  CanonColorData = 0x4001,
  Cr2Id = 0xc5d8,
  CanonCr2Slice = 0xc640,
  Cr2SRawMode = 0xc6c5,
}

fn typ_size(typ: u16) -> usize {
  match typ {
    1 | 2 | 6 | 7 => 1,
    3 | 8 => 2,
    4 | 9 | 11 => 4,
    5 | 10 | 12 => 8,
    _ => 0,
  }
}

#[derive(Debug, Clone)]
pub struct TiffEntry<'a> {
  tag: u16,
  typ: u16,
  count: usize,
  endian: Endian,
  data: &'a [u8],
}

impl<'a> TiffEntry<'a> {
  pub fn tag(&self) -> Option<Tag> {
    Tag::n(self.tag)
  }

  pub fn typ(&self) -> u16 {
    self.typ
  }

  pub fn count(&self) -> usize {
    self.count
  }

  pub fn get_u32(&self, idx: usize) -> u32 {
    let size = typ_size(self.typ);
    if size == 0 || (idx + 1) * size > self.data.len() {
      return 0;
    }
    match self.typ {
      1 | 2 | 6 | 7 => self.data[idx] as u32,
      3 | 8 => self.endian.ru16(self.data, idx * 2) as u32,
      4 | 9 => self.endian.ru32(self.data, idx * 4),
      5 | 10 => self.endian.ru32(self.data, idx * 8),
      _ => 0,
    }
  }

  pub fn get_u16(&self, idx: usize) -> u16 {
    match self.typ {
      3 | 8 => {
        if (idx + 1) * 2 > self.data.len() {
          0
        } else {
          self.endian.ru16(self.data, idx * 2)
        }
      }
      _ => self.get_u32(idx) as u16,
    }
  }

  pub fn get_usize(&self, idx: usize) -> usize {
    self.get_u32(idx) as usize
  }

  pub fn get_f32(&self, idx: usize) -> f32 {
    let size = typ_size(self.typ);
    if size == 0 || (idx + 1) * size > self.data.len() {
      return 0.0;
    }
    match self.typ {
      5 => {
        let num = self.endian.ru32(self.data, idx * 8) as f32;
        let den = self.endian.ru32(self.data, idx * 8 + 4) as f32;
        if den == 0.0 { 0.0 } else { num / den }
      }
      10 => {
        let num = self.endian.ru32(self.data, idx * 8) as i32 as f32;
        let den = self.endian.ru32(self.data, idx * 8 + 4) as i32 as f32;
        if den == 0.0 { 0.0 } else { num / den }
      }
      11 => f32::from_bits(self.endian.ru32(self.data, idx * 4)),
      _ => self.get_u32(idx) as f32,
    }
  }

  pub fn get_str(&self) -> String {
    match str::from_utf8(self.data) {
      Ok(val) => val.trim_end_matches('\0').trim().to_string(),
      Err(_) => String::new(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct TiffIFD<'a> {
  entries: Vec<TiffEntry<'a>>,
  sub_ifds: Vec<TiffIFD<'a>>,
  endian: Endian,
}

impl<'a> TiffIFD<'a> {
  /// Parse the root of a TIFF file. The chained top level IFDs end up as the
  /// sub IFDs of a synthetic root so the CR2 raw IFD is reachable as the 4th
  /// sub IFD, the way the file is actually laid out.
  pub fn new_root(buf: &'a [u8]) -> Result<TiffIFD<'a>, String> {
    if buf.len() < 8 {
      return Err("TIFF: File too small".to_string())
    }
    let endian = if buf[0..4] == b"II\x2a\0"[..] {
      Endian::Little
    } else if buf[0..4] == b"MM\0\x2a"[..] {
      Endian::Big
    } else {
      return Err("TIFF: Not a valid TIFF file".to_string())
    };

    let mut sub_ifds = Vec::new();
    let mut next_ifd = endian.ru32(buf, 4) as usize;
    let mut chained = 0;
    while next_ifd != 0 && chained < MAX_CHAIN_DEPTH {
      let ifd = TiffIFD::new(buf, next_ifd, endian, 0)?;
      next_ifd = ifd.next_ifd;
      sub_ifds.push(ifd.ifd);
      chained += 1;
    }
    if sub_ifds.is_empty() {
      return Err("TIFF: No IFDs found".to_string())
    }

    Ok(TiffIFD {
      entries: Vec::new(),
      sub_ifds,
      endian,
    })
  }

  fn new(buf: &'a [u8], offset: usize, endian: Endian, depth: usize) -> Result<ParsedIFD<'a>, String> {
    if depth > MAX_CHAIN_DEPTH {
      return Err("TIFF: IFD nesting too deep".to_string())
    }
    if offset + 2 > buf.len() {
      return Err("TIFF: IFD offset out of bounds".to_string())
    }
    let num_entries = endian.ru16(buf, offset) as usize;
    let entries_end = offset + 2 + num_entries * 12;
    if entries_end + 4 > buf.len() {
      return Err("TIFF: IFD entries out of bounds".to_string())
    }

    let mut entries = Vec::with_capacity(num_entries);
    let mut sub_ifds = Vec::new();
    for i in 0..num_entries {
      let pos = offset + 2 + i * 12;
      let tag = endian.ru16(buf, pos);
      let typ = endian.ru16(buf, pos + 2);
      let count = endian.ru32(buf, pos + 4) as usize;
      let size = typ_size(typ);
      if size == 0 || count > buf.len() / size {
        continue; // broken entry, skip it
      }
      let bytes = count * size;
      let data_offset = if bytes <= 4 {
        pos + 8
      } else {
        endian.ru32(buf, pos + 8) as usize
      };
      if data_offset + bytes > buf.len() {
        continue;
      }
      let entry = TiffEntry {
        tag,
        typ,
        count,
        endian,
        data: &buf[data_offset..data_offset + bytes],
      };

      if tag == Tag::SubIFDs as u16 {
        for n in 0..count {
          if let Ok(sub) = TiffIFD::new(buf, entry.get_usize(n), endian, depth + 1) {
            sub_ifds.push(sub.ifd);
          }
        }
      } else if tag == Tag::ExifIFDPointer as u16 {
        if let Ok(sub) = TiffIFD::new(buf, entry.get_usize(0), endian, depth + 1) {
          sub_ifds.push(sub.ifd);
        }
      } else if tag == Tag::Makernote as u16 {
        if let Ok(sub) = TiffIFD::new_makernote(buf, data_offset, endian, depth + 1) {
          sub_ifds.push(sub);
        }
      }
      entries.push(entry);
    }

    let next_ifd = endian.ru32(buf, entries_end) as usize;
    Ok(ParsedIFD {
      ifd: TiffIFD { entries, sub_ifds, endian },
      next_ifd,
    })
  }

  /// Canon makernotes are a bare IFD, sometimes prefixed with its own
  /// endianness marker
  fn new_makernote(buf: &'a [u8], offset: usize, endian: Endian, depth: usize) -> Result<TiffIFD<'a>, String> {
    let mut off = offset;
    let mut endian = endian;
    if buf.len() > off + 2 {
      if buf[off..off + 2] == b"II"[..] {
        off += 2;
        endian = Endian::Little;
      } else if buf[off..off + 2] == b"MM"[..] {
        off += 2;
        endian = Endian::Big;
      }
    }
    Ok(TiffIFD::new(buf, off, endian, depth)?.ifd)
  }

  pub fn find_entry(&self, tag: Tag) -> Option<&TiffEntry<'a>> {
    self.entries.iter().find(|e| e.tag == tag as u16)
  }

  pub fn has_entry(&self, tag: Tag) -> bool {
    self.find_entry(tag).is_some()
  }

  pub fn find_entry_recursive(&self, tag: Tag) -> Option<&TiffEntry<'a>> {
    if let Some(entry) = self.find_entry(tag) {
      return Some(entry);
    }
    for ifd in &self.sub_ifds {
      if let Some(entry) = ifd.find_entry_recursive(tag) {
        return Some(entry);
      }
    }
    None
  }

  pub fn find_ifds_with_tag(&self, tag: Tag) -> Vec<&TiffIFD<'a>> {
    let mut ifds = Vec::new();
    if self.has_entry(tag) {
      ifds.push(self);
    }
    for ifd in &self.sub_ifds {
      ifds.extend(ifd.find_ifds_with_tag(tag));
    }
    ifds
  }

  pub fn sub_ifds(&self) -> &Vec<TiffIFD<'a>> {
    &self.sub_ifds
  }
}

struct ParsedIFD<'a> {
  ifd: TiffIFD<'a>,
  next_ifd: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  // Minimal little endian TIFF writer for the tests
  pub struct TiffWriter {
    ifds: Vec<Vec<(u16, u16, Vec<u8>)>>,
  }

  impl TiffWriter {
    pub fn new() -> TiffWriter {
      TiffWriter { ifds: Vec::new() }
    }

    pub fn ifd(&mut self) -> usize {
      self.ifds.push(Vec::new());
      self.ifds.len() - 1
    }

    pub fn entry_u16(&mut self, ifd: usize, tag: u16, values: &[u16]) {
      let mut data = Vec::new();
      for v in values {
        data.extend(&v.to_le_bytes());
      }
      self.ifds[ifd].push((tag, 3, data));
    }

    pub fn entry_u32(&mut self, ifd: usize, tag: u16, values: &[u32]) {
      let mut data = Vec::new();
      for v in values {
        data.extend(&v.to_le_bytes());
      }
      self.ifds[ifd].push((tag, 4, data));
    }

    pub fn entry_str(&mut self, ifd: usize, tag: u16, value: &str) {
      let mut data = value.as_bytes().to_vec();
      data.push(0);
      self.ifds[ifd].push((tag, 2, data));
    }

    pub fn build(&self) -> Vec<u8> {
      let mut out = vec![0x49, 0x49, 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00];
      // lay out each IFD followed by its out of line data, chained together
      let mut pos = 8;
      for (n, entries) in self.ifds.iter().enumerate() {
        let table_len = 2 + entries.len() * 12 + 4;
        let mut extra = Vec::new();
        let mut extra_pos = pos + table_len;
        out.extend(&(entries.len() as u16).to_le_bytes());
        for (tag, typ, data) in entries {
          let count = match typ {
            3 => data.len() / 2,
            4 => data.len() / 4,
            _ => data.len(),
          };
          out.extend(&tag.to_le_bytes());
          out.extend(&typ.to_le_bytes());
          out.extend(&(count as u32).to_le_bytes());
          if data.len() <= 4 {
            let mut inline = data.clone();
            inline.resize(4, 0);
            out.extend(&inline);
          } else {
            out.extend(&(extra_pos as u32).to_le_bytes());
            extra.extend(data);
            extra_pos += data.len();
          }
        }
        let next = if n + 1 < self.ifds.len() { extra_pos as u32 } else { 0 };
        out.extend(&next.to_le_bytes());
        out.extend(&extra);
        pos = extra_pos;
      }
      out
    }
  }

  #[test]
  fn parses_chained_ifds() {
    let mut writer = TiffWriter::new();
    let ifd0 = writer.ifd();
    writer.entry_str(ifd0, Tag::Make as u16, "Canon");
    writer.entry_str(ifd0, Tag::Model as u16, "Canon EOS 550D");
    let ifd1 = writer.ifd();
    writer.entry_u32(ifd1, Tag::StripOffsets as u16, &[1000, 2000]);
    let buf = writer.build();

    let tiff = TiffIFD::new_root(&buf).unwrap();
    assert_eq!(tiff.sub_ifds().len(), 2);
    let make = tiff.find_entry_recursive(Tag::Make).unwrap();
    assert_eq!(make.tag(), Some(Tag::Make));
    assert_eq!(make.get_str(), "Canon");
    let offsets = tiff.find_entry_recursive(Tag::StripOffsets).unwrap();
    assert_eq!(offsets.count(), 2);
    assert_eq!(offsets.get_u32(1), 2000);
  }

  #[test]
  fn find_ifds_with_tag_walks_the_tree() {
    let mut writer = TiffWriter::new();
    let ifd0 = writer.ifd();
    writer.entry_u16(ifd0, Tag::ImageWidth as u16, &[100]);
    let ifd1 = writer.ifd();
    writer.entry_u16(ifd1, Tag::ImageWidth as u16, &[200]);
    let buf = writer.build();

    let tiff = TiffIFD::new_root(&buf).unwrap();
    let ifds = tiff.find_ifds_with_tag(Tag::ImageWidth);
    assert_eq!(ifds.len(), 2);
    assert_eq!(ifds[0].find_entry(Tag::ImageWidth).unwrap().get_u32(0), 100);
    assert_eq!(ifds[1].find_entry(Tag::ImageWidth).unwrap().get_u32(0), 200);
  }

  #[test]
  fn rejects_non_tiff_data() {
    assert!(TiffIFD::new_root(b"JFIF too short").is_err());
    assert!(TiffIFD::new_root(b"").is_err());
  }

  #[test]
  fn inline_and_out_of_line_values() {
    let mut writer = TiffWriter::new();
    let ifd0 = writer.ifd();
    writer.entry_u16(ifd0, Tag::ImageWidth as u16, &[5184]);
    writer.entry_u16(ifd0, Tag::CanonColorData as u16, &[1, 2, 3, 4, 5, 6]);
    let buf = writer.build();

    let tiff = TiffIFD::new_root(&buf).unwrap();
    let ifd = &tiff.sub_ifds()[0];
    assert_eq!(ifd.find_entry(Tag::ImageWidth).unwrap().get_u16(0), 5184);
    let colordata = ifd.find_entry(Tag::CanonColorData).unwrap();
    assert_eq!(colordata.count(), 6);
    assert_eq!(colordata.get_u16(5), 6);
    // reads past the data return zero instead of junk
    assert_eq!(colordata.get_u16(100), 0);
  }
}

use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Clamp a value to the given number of bits, used to get the final 16 bit
/// samples after the fixed point math in the sRaw conversion
pub fn clampbits(val: i32, bits: u32) -> u16 {
  let max = (1i32 << bits) - 1;
  if val < 0 {
    0
  } else if val > max {
    max as u16
  } else {
    val as u16
  }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Endian {
  Big,
  Little,
}

impl Endian {
  pub fn ru16(&self, buf: &[u8], pos: usize) -> u16 {
    match *self {
      Endian::Big => BigEndian::read_u16(&buf[pos..pos + 2]),
      Endian::Little => LittleEndian::read_u16(&buf[pos..pos + 2]),
    }
  }

  pub fn ru32(&self, buf: &[u8], pos: usize) -> u32 {
    match *self {
      Endian::Big => BigEndian::read_u32(&buf[pos..pos + 4]),
      Endian::Little => LittleEndian::read_u32(&buf[pos..pos + 4]),
    }
  }
}

/// Buffer that holds the whole file, padded at the end so the decoders can
/// read a full pump ahead without bounds juggling
#[derive(Debug, Clone)]
pub struct Buffer {
  pub buf: Vec<u8>,
  pub size: usize,
}

impl Buffer {
  pub fn new(reader: &mut dyn Read) -> Result<Buffer, String> {
    let mut buffer = Vec::new();
    if let Err(err) = reader.read_to_end(&mut buffer) {
      return Err(format!("IOError: {}", err));
    }
    let size = buffer.len();
    buffer.extend([0u8; 16].iter());
    Ok(Buffer { buf: buffer, size })
  }

  pub fn valid_range(&self, offset: usize, count: usize) -> bool {
    count > 0 && offset < self.size && count <= self.size - offset
  }
}

/// Substitution table for the linearization curve found in the old format
/// files (tag 0x123, always 4096 entries)
#[derive(Debug, Clone)]
pub struct LookupTable {
  table: Vec<u16>,
}

impl LookupTable {
  pub fn new(table: &[u16]) -> LookupTable {
    LookupTable { table: table.to_vec() }
  }

  pub fn lookup(&self, value: u16) -> u16 {
    let pos = (value as usize).min(self.table.len() - 1);
    self.table[pos]
  }
}

/// MSB-first bit reader over JPEG entropy coded data. Handles the 0xFF 0x00
/// byte stuffing and stops at the first real marker. Once the real data runs
/// out it keeps feeding zero bits and remembers it did, so the caller can
/// report the strip as truncated after the fact.
pub struct BitPumpJPEG<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
  fabricated: u32,
}

impl<'a> BitPumpJPEG<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpJPEG<'a> {
    BitPumpJPEG {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
      fabricated: 0,
    }
  }

  fn next_byte(&mut self) -> u8 {
    if self.pos >= self.buffer.len() {
      self.fabricated += 8;
      return 0;
    }
    let byte = self.buffer[self.pos];
    self.pos += 1;
    if byte == 0xff {
      if self.pos < self.buffer.len() && self.buffer[self.pos] == 0x00 {
        self.pos += 1;
        return 0xff;
      }
      // A real marker, the entropy coded data ends here
      self.pos = self.buffer.len();
      self.fabricated += 8;
      return 0;
    }
    byte
  }

  pub fn get_bits(&mut self, num: u32) -> u32 {
    if num == 0 {
      return 0;
    }
    while self.nbits < num {
      let byte = self.next_byte();
      self.bits = (self.bits << 8) | byte as u64;
      self.nbits += 8;
    }
    self.nbits -= num;
    ((self.bits >> self.nbits) & ((1 << num) - 1)) as u32
  }

  /// True when the decode had to make up bits past the end of the stream
  pub fn is_exhausted(&self) -> bool {
    self.fabricated > 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clampbits_limits_to_range() {
    assert_eq!(clampbits(-100, 16), 0);
    assert_eq!(clampbits(0, 16), 0);
    assert_eq!(clampbits(1234, 16), 1234);
    assert_eq!(clampbits(65535, 16), 65535);
    assert_eq!(clampbits(100000, 16), 65535);
  }

  #[test]
  fn lookup_table_substitutes_and_clamps() {
    let table: Vec<u16> = (0..4096).map(|i| (i as u16) / 2).collect();
    let lookup = LookupTable::new(&table);
    assert_eq!(lookup.lookup(100), 50);
    assert_eq!(lookup.lookup(4095), 2047);
    // out of range inputs get the last entry
    assert_eq!(lookup.lookup(5000), 2047);
  }

  #[test]
  fn bitpump_reads_msb_first() {
    let data = [0b1011_0010, 0b0100_0000];
    let mut pump = BitPumpJPEG::new(&data);
    assert_eq!(pump.get_bits(1), 1);
    assert_eq!(pump.get_bits(3), 0b011);
    assert_eq!(pump.get_bits(6), 0b001001);
    assert!(!pump.is_exhausted());
  }

  #[test]
  fn bitpump_unstuffs_ff00() {
    let data = [0xff, 0x00, 0x80];
    let mut pump = BitPumpJPEG::new(&data);
    assert_eq!(pump.get_bits(8), 0xff);
    assert_eq!(pump.get_bits(8), 0x80);
    assert!(!pump.is_exhausted());
  }

  #[test]
  fn bitpump_stops_at_marker_and_flags_exhaustion() {
    let data = [0xa5, 0xff, 0xd9];
    let mut pump = BitPumpJPEG::new(&data);
    assert_eq!(pump.get_bits(8), 0xa5);
    // the EOI marker ends the stream, everything after is fabricated zeros
    assert_eq!(pump.get_bits(8), 0);
    assert!(pump.is_exhausted());
  }

  #[test]
  fn buffer_range_validity() {
    let mut data: &[u8] = &[0u8; 100];
    let buffer = Buffer::new(&mut data).unwrap();
    assert!(buffer.valid_range(0, 100));
    assert!(buffer.valid_range(90, 10));
    assert!(!buffer.valid_range(90, 11));
    assert!(!buffer.valid_range(100, 1));
    assert!(!buffer.valid_range(0, 0));
  }
}

use crate::decoders::basics::*;

/// One DC Huffman table from a DHT segment, with the canonical code
/// assignment precomputed into the usual mincode/maxcode/valptr form
#[derive(Debug, Clone)]
pub struct HuffTable {
  mincode: [i32; 17],
  maxcode: [i32; 17],
  valptr: [usize; 17],
  huffval: Vec<u8>,
}

impl HuffTable {
  pub fn new(bits: &[usize; 17], huffval: Vec<u8>) -> Result<HuffTable, String> {
    // canonical codes in increasing length order
    let mut huffcode = Vec::new();
    let mut code = 0u32;
    for len in 1..17 {
      for _ in 0..bits[len] {
        huffcode.push(code);
        code += 1;
      }
      code <<= 1;
    }
    if huffcode.is_empty() || huffcode.len() > huffval.len() {
      return Err("ljpeg: invalid huffman table".to_string())
    }

    let mut mincode = [0i32; 17];
    let mut maxcode = [-1i32; 17];
    let mut valptr = [0usize; 17];
    let mut p = 0;
    for len in 1..17 {
      if bits[len] > 0 {
        valptr[len] = p;
        mincode[len] = huffcode[p] as i32;
        p += bits[len];
        maxcode[len] = huffcode[p - 1] as i32;
      }
    }

    Ok(HuffTable {
      mincode,
      maxcode,
      valptr,
      huffval,
    })
  }

  /// Decode one difference value: the ssss category code followed by ssss
  /// magnitude bits, sign extended the lossless JPEG way
  pub fn decode(&self, pump: &mut BitPumpJPEG) -> Result<i32, String> {
    let mut code = 0i32;
    for len in 1..17 {
      code = (code << 1) | pump.get_bits(1) as i32;
      if self.maxcode[len] >= code && self.mincode[len] <= code {
        let idx = self.valptr[len] + (code - self.mincode[len]) as usize;
        let ssss = self.huffval[idx] as u32;
        return Ok(match ssss {
          0 => 0,
          16 => 32768,
          s => {
            let diff = pump.get_bits(s) as i32;
            if diff < (1 << (s - 1)) {
              diff - (1 << s) + 1
            } else {
              diff
            }
          }
        });
      }
    }
    Err("ljpeg: bad huffman code in stream".to_string())
  }
}

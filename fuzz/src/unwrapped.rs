#[macro_use]
extern crate afl;
extern crate rawcanon;

fn main() {
    rawcanon::force_initialization();

  fuzz_nohook!(|data: &[u8]| {
    rawcanon::decode_unwrapped(&mut &data[..]).ok();
  });
}

//! Library to extract the raw data and some metadata from Canon CR2 files.
//! Both the early single strip files (1D, 1DS, D2000C) and the sliced files
//! of every later body are supported, including the subsampled sRaw and
//! mRaw modes which get interpolated back to full resolution RGB.
//!
//! # Example
//! ```rust,no_run
//! use std::env;
//! fn main() {
//!   let args: Vec<_> = env::args().collect();
//!   if args.len() != 2 {
//!     println!("Usage: {} <file>", args[0]);
//!     std::process::exit(2);
//!   }
//!   let file = &args[1];
//!   let image = rawcanon::decode_file(file).unwrap();
//!   println!("Decoded a {}x{} image with {} samples per pixel",
//!            image.width, image.height, image.cpp);
//! }
//! ```

#[macro_use] extern crate lazy_static;

#[doc(hidden)] pub mod decoders;
pub use crate::decoders::Buffer;
pub use crate::decoders::Camera;
pub use crate::decoders::Decoder;
pub use crate::decoders::RawCanon;
pub use crate::decoders::RawImage;

use std::io::Read;

lazy_static! {
  static ref LOADER: decoders::RawCanon = decoders::RawCanon::new();
}

/// Take a path to a CR2 file and return a decoded image or an error
///
/// # Example
/// ```rust,ignore
/// let image = rawcanon::decode_file("path/to/your/file.CR2").unwrap();
/// ```
pub fn decode_file(path: &str) -> Result<RawImage, String> {
  LOADER.decode_safe(path)
}

/// Take a readable source and return a decoded image or an error
pub fn decode(reader: &mut dyn Read) -> Result<RawImage, String> {
  LOADER.decode(reader)
}

// Used to force lazy_static initialization so decoding is benchmarked on
// its own
#[doc(hidden)] pub fn force_initialization() {
  lazy_static::initialize(&LOADER);
}

/// Like [decode](fn.decode.html) but leave the linearization curve of the
/// old format files unapplied and attached to the image instead
pub fn decode_uncorrected(reader: &mut dyn Read) -> Result<RawImage, String> {
  LOADER.decode_uncorrected(reader)
}

// Used for fuzzing targets that just want to test the actual decoders
#[doc(hidden)] pub fn decode_unwrapped(reader: &mut dyn Read) -> Result<RawImage, String> {
  LOADER.decode(reader)
}

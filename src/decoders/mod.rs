use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::panic;

macro_rules! fetch_tag {
  ($tiff:expr, $tag:expr) => (
    match $tiff.find_entry($tag) {
      Some(entry) => entry,
      None => return Err(format!("Couldn't find tag {:?}", $tag).to_string()),
    }
  );
  ($tiff:expr, $tag:expr, $error:expr) => (
    match $tiff.find_entry($tag) {
      Some(entry) => entry,
      None => return Err($error.to_string()),
    }
  );
}

macro_rules! fetch_ifd {
  ($tiff:expr, $tag:expr) => (
    match $tiff.find_ifds_with_tag($tag).first() {
      Some(ifd) => *ifd,
      None => return Err(format!("Couldn't find IFD with tag {:?}", $tag).to_string()),
    }
  );
}

pub mod basics;
pub mod tiff;
pub mod ljpeg;
pub mod cr2;

pub use self::basics::{Buffer, LookupTable};
use self::tiff::*;

pub static CAMERAS_TOML: &str = include_str!(concat!(env!("OUT_DIR"), "/cameras.toml"));

/// One entry of the camera quirk database. The hints are the raw strings
/// from the toml files, decoders turn them into their own typed settings.
#[derive(Debug, Clone)]
pub struct Camera {
  pub make: String,
  pub model: String,
  pub mode: String,
  pub wb_offset: Option<usize>,
  pub hints: Vec<String>,
}

impl Camera {
  pub fn find_hint(&self, hint: &str) -> bool {
    self.hints.iter().any(|h| h == hint)
  }

  fn from_toml(value: &toml::Value) -> Option<Camera> {
    let make = value.get("make")?.as_str()?.to_string();
    let model = value.get("model")?.as_str()?.to_string();
    let mode = match value.get("mode") {
      Some(mode) => mode.as_str()?.to_string(),
      None => String::new(),
    };
    let wb_offset = value.get("wb_offset")
                         .and_then(|v| v.as_integer())
                         .map(|v| v as usize);
    let hints = match value.get("hints") {
      Some(hints) => hints.as_array()?
                          .iter()
                          .filter_map(|h| h.as_str())
                          .map(|h| h.to_string())
                          .collect(),
      None => Vec::new(),
    };
    Some(Camera { make, model, mode, wb_offset, hints })
  }
}

/// The decoded image: samples plus the metadata the next pipeline stage
/// needs. `errors` collects the non fatal problems hit along the way, so an
/// Ok image is only complete when it comes back empty.
#[derive(Debug, Clone)]
pub struct RawImage {
  pub make: String,
  pub model: String,
  pub width: usize,
  pub height: usize,
  pub cpp: usize,
  pub wb_coeffs: [f32; 4],
  pub data: Vec<u16>,
  pub is_cfa: bool,
  pub cfa: String,
  pub subsampling: (usize, usize),
  pub linearization: Option<LookupTable>,
  pub errors: Vec<String>,
}

impl RawImage {
  pub fn set_error(&mut self, error: &str) {
    self.errors.push(error.to_string());
  }
}

pub fn ok_image(camera: &Camera, width: usize, height: usize,
                wb_coeffs: [f32; 4], image: Vec<u16>) -> Result<RawImage, String> {
  Ok(RawImage {
    make: camera.make.clone(),
    model: camera.model.clone(),
    width,
    height,
    cpp: 1,
    wb_coeffs,
    data: image,
    is_cfa: true,
    cfa: "RGGB".to_string(),
    subsampling: (1, 1),
    linearization: None,
    errors: Vec::new(),
  })
}

pub trait Decoder {
  /// Check make/model/mode support without touching any pixel data
  fn identify(&self) -> Result<&Camera, String>;
  /// Decode the image with the linearization curve applied
  fn image(&self) -> Result<RawImage, String>;
  /// Decode the image leaving the samples uncorrected, with the
  /// linearization curve attached to the image instead of applied
  fn image_uncorrected(&self) -> Result<RawImage, String>;
}

#[derive(Debug, Clone)]
pub struct RawCanon {
  pub cameras: HashMap<(String, String, String), Camera>,
}

impl RawCanon {
  pub fn new() -> RawCanon {
    let main: toml::Value = CAMERAS_TOML.parse().expect("broken cameras.toml");
    let mut map = HashMap::new();
    if let Some(list) = main.get("cameras").and_then(|c| c.as_array()) {
      for value in list {
        if let Some(camera) = Camera::from_toml(value) {
          let key = (camera.make.clone(), camera.model.clone(), camera.mode.clone());
          map.insert(key, camera);
        }
      }
    }
    RawCanon { cameras: map }
  }

  pub fn get_decoder<'b>(&'b self, buf: &'b Buffer) -> Result<Box<dyn Decoder + 'b>, String> {
    let buffer = &buf.buf;
    if buffer.len() < 8 {
      return Err("File too small to be a raw file".to_string())
    }
    if buffer[0..4] == b"II\x2a\0"[..] || buffer[0..4] == b"MM\0\x2a"[..] {
      let tiff = TiffIFD::new_root(buffer)?;
      let make = tiff.find_entry_recursive(Tag::Make)
                     .map(|e| e.get_str())
                     .unwrap_or_default();
      if make.contains("Canon") {
        return Ok(Box::new(cr2::Cr2Decoder::new(buf, tiff, self)))
      }
      return Err(format!("Couldn't find a decoder for make \"{}\"", make).to_string())
    }
    Err("Couldn't determine the raw format".to_string())
  }

  pub fn check_supported_with_everything(&self, make: &str, model: &str,
                                         mode: &str) -> Result<&Camera, String> {
    self.cameras.get(&(make.to_string(), model.to_string(), mode.to_string()))
        .or_else(|| self.cameras.get(&(make.to_string(), model.to_string(), String::new())))
        .ok_or_else(|| format!("Couldn't find camera \"{}\" \"{}\" mode \"{}\"", make, model, mode))
  }

  pub fn check_supported(&self, tiff: &TiffIFD) -> Result<&Camera, String> {
    let ifd = fetch_ifd!(tiff, Tag::Model);
    let make = fetch_tag!(ifd, Tag::Make, "Couldn't find Make").get_str();
    let model = fetch_tag!(ifd, Tag::Model, "Couldn't find Model").get_str();
    self.check_supported_with_everything(&make, &model, "")
  }

  pub fn decode(&self, reader: &mut dyn Read) -> Result<RawImage, String> {
    let buffer = Buffer::new(reader)?;
    let decoder = self.get_decoder(&buffer)?;
    decoder.image()
  }

  pub fn decode_uncorrected(&self, reader: &mut dyn Read) -> Result<RawImage, String> {
    let buffer = Buffer::new(reader)?;
    let decoder = self.get_decoder(&buffer)?;
    decoder.image_uncorrected()
  }

  pub fn decode_file(&self, path: &str) -> Result<RawImage, String> {
    let mut file = match File::open(path) {
      Ok(val) => val,
      Err(e) => return Err(e.to_string()),
    };
    self.decode(&mut file)
  }

  pub fn decode_safe(&self, path: &str) -> Result<RawImage, String> {
    match panic::catch_unwind(panic::AssertUnwindSafe(|| self.decode_file(path))) {
      Ok(val) => val,
      Err(_) => Err(format!("Panic while decoding \"{}\"", path).to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_database_loads() {
    let loader = RawCanon::new();
    assert!(!loader.cameras.is_empty());
    let camera = loader.check_supported_with_everything(
      "Canon", "Canon EOS 5D Mark III", "sraw1").unwrap();
    assert!(camera.find_hint("sraw_new"));
    assert!(!camera.find_hint("sraw_40d"));
  }

  #[test]
  fn mode_lookup_falls_back_to_the_plain_entry() {
    let loader = RawCanon::new();
    // no dedicated sraw entry for the 5DS, the base camera covers it
    let camera = loader.check_supported_with_everything(
      "Canon", "Canon EOS 5DS", "sraw1").unwrap();
    assert_eq!(camera.mode, "");
  }

  #[test]
  fn unknown_camera_is_rejected() {
    let loader = RawCanon::new();
    assert!(loader.check_supported_with_everything("Canon", "Canon EOS 0D", "").is_err());
  }

  #[test]
  fn old_format_cameras_carry_the_hint() {
    let loader = RawCanon::new();
    let camera = loader.check_supported_with_everything("Canon", "Canon EOS D2000C", "").unwrap();
    assert!(camera.find_hint("old_format"));
    assert!(camera.find_hint("double_line_ljpeg"));
  }
}

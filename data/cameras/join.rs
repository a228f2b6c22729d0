extern crate glob;
extern crate toml;

use std::env;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use glob::glob;

// Joins all the per-camera toml files into a single $OUT_DIR/cameras.toml
// that gets embedded into the library with include_str!
fn main() {
  let out_dir = env::var("OUT_DIR").unwrap();
  let dest_path = Path::new(&out_dir).join("cameras.toml");
  let mut out = File::create(dest_path).unwrap();

  println!("cargo:rerun-if-changed=data/cameras/");
  let mut joined = String::new();
  for entry in glob("data/cameras/*.toml").expect("Failed to read glob pattern") {
    let path = entry.unwrap();
    println!("cargo:rerun-if-changed={}", path.display());
    let mut contents = String::new();
    File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
    // Make sure each file is valid on its own so errors point at the right file
    if let Err(e) = contents.parse::<toml::Value>() {
      panic!("{} is not valid toml: {}", path.display(), e);
    }
    joined.push_str(&contents);
    joined.push('\n');
  }

  if let Err(e) = joined.parse::<toml::Value>() {
    panic!("joined cameras.toml is not valid toml: {}", e);
  }
  out.write_all(joined.as_bytes()).unwrap();
}

use std::env;
use std::fs::File;

fn usage() {
    println!("identify <file>");
    std::process::exit(1);
}

fn error(err: &str) {
    println!("ERROR: {}", err);
    std::process::exit(2);
}

fn main() {
    let args: Vec<_> = env::args().collect();
    if args.len() != 2 {
        usage();
    }
    let file = &args[1];

    let mut f = match File::open(file) {
        Ok(val) => val,
        Err(e) => {
            error(&e.to_string());
            return;
        }
    };
    let image = match rawcanon::decode(&mut f) {
        Ok(val) => val,
        Err(e) => {
            error(&e);
            return;
        }
    };

    println!("Make:        {}", image.make);
    println!("Model:       {}", image.model);
    println!("Size:        {}x{}", image.width, image.height);
    println!("Components:  {}", image.cpp);
    println!("CFA:         {}", if image.is_cfa { &image.cfa } else { "none" });
    println!("Subsampling: {}x{}", image.subsampling.0, image.subsampling.1);
    println!("WB coeffs:   {:?}", image.wb_coeffs);
    if !image.errors.is_empty() {
        println!("Errors during decoding:");
        for e in &image.errors {
            println!("  {}", e);
        }
    }
}

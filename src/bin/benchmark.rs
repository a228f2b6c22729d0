use std::env;
use std::fs::File;
use std::time::Instant;

fn usage() {
    println!("benchmark <file>");
    std::process::exit(1);
}

static ITERATIONS: u32 = 50;

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
    println!("Loading file \"{}\"", file);

    let mut f = match File::open(file) {
        Ok(val) => val,
        Err(e) => {
            error(&e.to_string());
            return;
        }
    };
    let buffer = match rawcanon::Buffer::new(&mut f) {
        Ok(val) => val,
        Err(e) => {
            error(&e);
            return;
        }
    };
    let rawcanon = rawcanon::RawCanon::new();
    let from_time = Instant::now();
    {
        for _ in 0..ITERATIONS {
            let decoder = match rawcanon.get_decoder(&buffer) {
                Ok(val) => val,
                Err(e) => {
                    error(&e);
                    return;
                }
            };
            match decoder.image() {
                Ok(_) => {}
                Err(e) => error(&e),
            }
        }
    }
    let elapsed = from_time.elapsed();

    let avgtime = (elapsed.as_micros() / ITERATIONS as u128) as f64 / 1000.0;
    println!("Average decode time: {} ms ({} iterations)", avgtime, ITERATIONS);
}

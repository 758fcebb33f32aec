//! Reframe a raw HEVC stream and report its parameter sets
#![allow(clippy::print_stdout)]
use std::env;
use std::fs;

use zenheif_compose::hevc::{annexb_to_length_prefixed, extract_parameter_sets};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <stream.h265> [output]", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let mut data = fs::read(path).expect("Failed to read stream");
    println!("File: {} ({} bytes)", path, data.len());

    match extract_parameter_sets(&data) {
        Ok(sets) => {
            println!("VPS: {} bytes", sets.vps.len());
            println!("SPS: {} bytes", sets.sps.len());
            println!("PPS: {} bytes", sets.pps.len());
            println!("Decoder configuration payload: {} bytes", sets.total_size());
        }
        Err(e) => {
            eprintln!("Parameter set scan error: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = annexb_to_length_prefixed(&mut data) {
        eprintln!("Reframe error: {}", e);
        std::process::exit(1);
    }

    if let Some(output) = args.get(2) {
        fs::write(output, &data).expect("Failed to write output");
        println!("Length-prefixed stream written to {}", output);
    }
}

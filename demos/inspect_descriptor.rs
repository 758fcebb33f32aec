//! Decode and print a grid or overlay descriptor payload
#![allow(clippy::print_stdout)]
use std::env;
use std::fs;

use zenheif_compose::{read_image_grid, read_image_overlay};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} grid|iovl <payload-file>", args[0]);
        std::process::exit(1);
    }

    let kind = &args[1];
    let data = fs::read(&args[2]).expect("Failed to read payload file");

    match kind.as_str() {
        "grid" => match read_image_grid(&mut data.as_slice()) {
            Ok(grid) => {
                println!("Grid: {}×{} tiles", grid.columns(), grid.rows());
                println!("Output: {}×{}", grid.output_width, grid.output_height);
            }
            Err(e) => {
                eprintln!("Decode error: {}", e);
                std::process::exit(1);
            }
        },
        "iovl" => match read_image_overlay(&data) {
            Ok(iovl) => {
                println!(
                    "Canvas: {}×{}, fill rgba({}, {}, {}, {})",
                    iovl.output_width,
                    iovl.output_height,
                    iovl.canvas_fill_value_r,
                    iovl.canvas_fill_value_g,
                    iovl.canvas_fill_value_b,
                    iovl.canvas_fill_value_a
                );
                println!("Number of sub-images: {}", iovl.offsets.len());
                for (i, entry) in iovl.offsets.iter().enumerate() {
                    println!("  Offset {}: ({}, {})", i, entry.horizontal_offset, entry.vertical_offset);
                }
            }
            Err(e) => {
                eprintln!("Decode error: {}", e);
                std::process::exit(1);
            }
        },
        _ => {
            eprintln!("Unknown descriptor kind: {}", kind);
            std::process::exit(1);
        }
    }
}

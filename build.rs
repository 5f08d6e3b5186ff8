//! Generates the stack-frame size-class quantization table.
//!
//! The table has ~178 buckets growing by a factor of 1.1, rounded up to the
//! next multiple of 8 bytes (frame slots are always 8-byte aligned). Baked in
//! at build time rather than computed on first use, mirroring the teacher's
//! `raya-engine/build.rs` approach of generating constants ahead of time.

use std::env;
use std::fs;
use std::path::Path;

const MIN_FRAME_SIZE: u32 = 16;
const MAX_FRAME_SIZE: u32 = 1 << 24;
const GROWTH_FACTOR: f64 = 1.1;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("size_classes.rs");

    let mut classes: Vec<u32> = Vec::new();
    let mut size = MIN_FRAME_SIZE as f64;
    while (size as u32) < MAX_FRAME_SIZE {
        let rounded = round_up_to_8(size as u32);
        if classes.last().copied() != Some(rounded) {
            classes.push(rounded);
        }
        size *= GROWTH_FACTOR;
    }
    classes.push(MAX_FRAME_SIZE);

    let mut out = String::new();
    out.push_str("/// Quantized stack-frame size categories, smallest to largest.\n");
    out.push_str(&format!(
        "pub static SIZE_CLASSES: [u32; {}] = [\n",
        classes.len()
    ));
    for c in &classes {
        out.push_str(&format!("    {c},\n"));
    }
    out.push_str("];\n");

    fs::write(&dest_path, out).expect("failed to write size_classes.rs");
    println!("cargo:rerun-if-changed=build.rs");
}

fn round_up_to_8(n: u32) -> u32 {
    (n + 7) & !7
}

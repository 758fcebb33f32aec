#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, and a successful decode must re-encode.
    if let Ok(iovl) = zenheif_compose::read_image_overlay(data) {
        let mut out = Vec::new();
        zenheif_compose::write_image_overlay(&iovl, &mut out).unwrap();
    }
});

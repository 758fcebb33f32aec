#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut src = data;
    let _ = zenheif_compose::read_image_grid(&mut src);
});

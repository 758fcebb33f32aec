#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buffer = data.to_vec();
    let _ = zenheif_compose::hevc::annexb_to_length_prefixed(&mut buffer);
    if !data.is_empty() {
        let sets = zenheif_compose::hevc::extract_parameter_sets(data).unwrap();
        assert!(sets.total_size() <= data.len());
    }
});

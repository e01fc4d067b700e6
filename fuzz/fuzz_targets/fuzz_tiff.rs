#![no_main]

use libfuzzer_sys::fuzz_target;
use nexuslims_extract::formats::tiff::{tags, TiffDirectory};

fuzz_target!(|data: &[u8]| {
    // Parsing may fail, but must never panic
    if let Ok(dir) = TiffDirectory::from_bytes(data) {
        for entry in dir.entries() {
            let _ = dir.bytes(entry.tag);
            let _ = dir.ascii(entry.tag);
            let _ = dir.unsigned(entry.tag);
        }
        let _ = dir.unsigned(tags::IMAGE_WIDTH);
    }
});

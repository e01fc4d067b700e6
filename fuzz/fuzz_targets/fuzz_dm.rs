#![no_main]

use libfuzzer_sys::fuzz_target;
use nexuslims_extract::formats::dm::DmFile;

fuzz_target!(|data: &[u8]| {
    if let Ok(file) = DmFile::from_bytes(data) {
        // Walking the tree exercises every decoded value
        let _ = file.to_metadata();
        let _ = file.get(&["ImageList"]);
    }
});

#![no_main]

use latchkey_core::pipeline::open_envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cost bytes: log_n at 7, r at 8..12, p at 12..16
    if data.len() >= 16 {
        let r = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let p = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        if data[7] > 4 || r > 8 || p > 1 {
            return;
        }
    }
    let _ = open_envelope(data, b"fuzz");
});

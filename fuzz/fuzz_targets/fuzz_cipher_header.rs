#![no_main]

use latchkey_core::pipeline::{decrypt, CipherHeader, HEADER_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(header) = CipherHeader::from_bytes(data) else {
        return;
    };

    // A parsed header re-serializes to the bytes it came from
    assert_eq!(&header.to_bytes()[..], &data[..HEADER_LEN]);

    // Only run the KDF for cheap parameters
    let params = header.params;
    if params.log_n <= 4 && params.r <= 8 && params.p <= 1 {
        let _ = decrypt(data, b"fuzz");
    }
});

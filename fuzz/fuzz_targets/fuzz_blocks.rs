#![no_main]

use latchkey_core::remote::{encode_blocks, read_block, read_blocks};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok((block, rest)) = read_block(data) {
        assert_eq!(4 + block.len() + rest.len(), data.len());
    }

    // Exactly three blocks re-encode to the same bytes
    if let Ok(blocks) = read_blocks::<3>(data) {
        let encoded = encode_blocks(&blocks).unwrap();
        assert_eq!(encoded, data);
    }
});

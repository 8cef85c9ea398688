#![no_main]

use latchkey_daemon::IpcRequest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = IpcRequest::decode(data) {
        // Whatever decodes must name a known operation and encode again
        let _ = request.operation().name();
        let encoded = serde_json::to_vec(&request).unwrap();
        assert!(IpcRequest::decode(&encoded).is_ok());
    }
});

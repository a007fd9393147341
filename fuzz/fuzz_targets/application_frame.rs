#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls_core::ApplicationFrame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = ApplicationFrame::parse(data) {
        assert_eq!(frame.to_bytes(), data);
    }
});

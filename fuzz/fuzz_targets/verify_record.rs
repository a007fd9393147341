#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls_core::frame::VerifyRecord;

fuzz_target!(|data: &[u8]| {
    if let Ok((record, consumed)) = VerifyRecord::parse(data) {
        assert!(consumed <= data.len());
        if let Ok(encoded) = record.to_bytes() {
            assert_eq!(encoded, &data[..consumed]);
        }
    }
});

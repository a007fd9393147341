#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls_core::frame::ServerHello;

fuzz_target!(|data: &[u8]| {
    if let Ok(hello) = ServerHello::parse(data) {
        // Accepted hellos must re-encode to the input.
        assert_eq!(hello.to_bytes(), data);
    }
});

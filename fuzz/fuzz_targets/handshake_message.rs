#![no_main]

use libfuzzer_sys::fuzz_target;
use ptls_core::frame::{strip_sequence, HandshakeMessage};

fuzz_target!(|data: &[u8]| {
    // Inbound handshake frames: mask the sequence nibble, then classify.
    let mut frame = data.to_vec();
    if strip_sequence(&mut frame).is_some() {
        let _ = HandshakeMessage::parse(&frame);
    }
});

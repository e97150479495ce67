//! Fuzz target for STOMP frame decoding
//!
//! A single WebSocket message may carry several NUL-terminated frames,
//! heart-beat newlines, or a frame cut short. None of that may panic.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - Every decoded frame encodes back to text that decodes to one frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use linkwave_proto::StompFrame;

fuzz_target!(|text: &str| {
    let Ok(frames) = StompFrame::decode_all(text) else {
        return;
    };

    for frame in frames {
        let _ = frame.header("destination");
        let _ = frame.header("content-length");

        if let Ok(again) = StompFrame::decode_all(&frame.encode()) {
            assert_eq!(again.len(), 1, "re-encoded frame split into {} frames", again.len());
            assert_eq!(again[0].command, frame.command);
        }
    }
});

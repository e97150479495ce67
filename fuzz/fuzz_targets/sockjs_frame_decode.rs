//! Fuzz target for SockJS frame decoding
//!
//! # Invariants
//!
//! - Decoding arbitrary text never panics
//! - Messages wrapped by `encode_messages` come back unchanged as an `a` frame

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use linkwave_proto::{SockJsFrame, sockjs::encode_messages};

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Wrapped(Vec<String>),
}

fuzz_target!(|input: Input| {
    match input {
        Input::Raw(text) => {
            let _ = SockJsFrame::decode(&text);
        },
        Input::Wrapped(messages) => {
            let frame = format!("a{}", encode_messages(&messages));
            let decoded = SockJsFrame::decode(&frame);
            assert_eq!(decoded.ok(), Some(SockJsFrame::Messages(messages)));
        },
    }
});

//! Fuzz target for the JSON event decoder
//!
//! Feeds arbitrary text to `decode_json` and to the STOMP topic body path.
//! Gateway frames are untrusted: the decoder must NEVER panic, only return
//! an error for frames it cannot map.

#![no_main]

use libfuzzer_sys::fuzz_target;
use linkwave_proto::{decode_json, decode_topic_body};

fuzz_target!(|text: &str| {
    let _ = decode_json(text);
    let _ = decode_topic_body(None, text);
    let _ = decode_topic_body(Some("42"), text);
});

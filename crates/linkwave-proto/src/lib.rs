//! Wire protocol for the linkwave realtime gateway.
//!
//! The gateway is reached over one of two framings, selected by configuration:
//!
//! - Plain WebSocket: every text frame is a JSON object with a `type`
//!   discriminator ([`envelope`], [`event`]).
//! - STOMP 1.2 over WebSocket, optionally wrapped in SockJS framing
//!   ([`stomp`], [`sockjs`]). Outbound envelopes become `SEND` frames, inbound
//!   events arrive as `MESSAGE` frames on subscribed topics.
//!
//! This crate is pure data and codecs: no I/O, no time, no state. Every
//! decoder returns [`ProtocolError`] on bad input instead of panicking.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod event;
pub mod sockjs;
pub mod stomp;

pub use envelope::OutboundEnvelope;
pub use errors::ProtocolError;
pub use event::{
    ChatMessage, Control, EventKind, Inbound, InboundEvent, PresenceStatus, decode_json,
    decode_topic_body,
};
pub use sockjs::SockJsFrame;
pub use stomp::{StompCommand, StompFrame};

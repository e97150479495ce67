//! Transport framing as seen by the connection manager.
//!
//! [`Codec`] turns manager intents (send envelope, subscribe, heartbeat) into
//! wire text and wire text into [`WireInput`]s. The manager never looks at
//! raw frames, so the JSON, STOMP and SockJS-wrapped STOMP dialects share one
//! state machine.

use std::time::Duration;

use linkwave_proto::{
    Inbound, OutboundEnvelope, ProtocolError, SockJsFrame, StompCommand, StompFrame, decode_json,
    decode_topic_body, sockjs, stomp::parse_heartbeat,
};

use crate::config::{StompConfig, TOPIC_PLACEHOLDER, TransportConfig, TransportKind};

/// One decoded unit of inbound wire text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireInput {
    /// SockJS session is open; the STOMP handshake may start.
    SessionOpen,
    /// STOMP `CONNECTED` with the server's `heart-beat` offer.
    Connected {
        /// Server `(send_every_ms, expect_every_ms)`.
        server_heartbeat: (u64, u64),
    },
    /// Event or control frame from the gateway.
    Inbound(Inbound),
    /// STOMP `MESSAGE` received under a subscription.
    Delivery {
        /// Value of the `subscription` header.
        subscription: Option<String>,
        /// Decoded body.
        inbound: Inbound,
    },
    /// Keepalive with no content.
    Heartbeat,
    /// Frame the manager has no use for (`RECEIPT`, unexpected commands).
    Ignored,
    /// STOMP `ERROR`; the server closes the connection after sending it.
    ServerError(String),
    /// SockJS close frame.
    ServerClose(String),
    /// Undecodable frame, logged and dropped.
    Invalid(ProtocolError),
}

/// What happens after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStep {
    /// Session usable immediately.
    Ready,
    /// Send this handshake and wait for the reply.
    Handshake(String),
    /// Wait for the server to speak first (SockJS `o`).
    Wait,
}

/// Framing for the configured transport.
#[derive(Debug, Clone)]
pub enum Codec {
    /// One JSON envelope per text frame.
    Json,
    /// STOMP, optionally SockJS-wrapped.
    Stomp(StompCodec),
}

/// STOMP framing state.
#[derive(Debug, Clone)]
pub struct StompCodec {
    config: StompConfig,
    heartbeat: Duration,
}

impl Codec {
    /// Codec for `transport`. `heartbeat` is offered in both directions
    /// during the STOMP handshake.
    pub fn new(transport: &TransportConfig, heartbeat: Duration) -> Self {
        match transport {
            TransportConfig::Json => Self::Json,
            TransportConfig::Stomp(config) => {
                Self::Stomp(StompCodec { config: config.clone(), heartbeat })
            },
        }
    }

    /// Transport tag.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Json => TransportKind::Json,
            Self::Stomp(_) => TransportKind::Stomp,
        }
    }

    /// URL to open for one connection attempt.
    ///
    /// SockJS needs a fresh server/session path per attempt, derived from
    /// `entropy`.
    pub fn open_url(&self, base: &str, entropy: u64) -> String {
        match self {
            Self::Stomp(stomp) if stomp.config.sockjs => {
                let server_id = (entropy % 1000) as u16;
                sockjs::transport_url(base, server_id, &sockjs::session_id(&entropy.to_be_bytes()))
            },
            _ => base.to_string(),
        }
    }

    /// Step to take once the socket is open.
    pub fn on_open(&self) -> OpenStep {
        match self {
            Self::Json => OpenStep::Ready,
            Self::Stomp(stomp) if stomp.config.sockjs => OpenStep::Wait,
            Self::Stomp(stomp) => OpenStep::Handshake(stomp.connect_frame()),
        }
    }

    /// STOMP `CONNECT` text, for when the SockJS session opens.
    pub fn handshake(&self) -> Option<String> {
        match self {
            Self::Json => None,
            Self::Stomp(stomp) => Some(stomp.connect_frame()),
        }
    }

    /// Heartbeat offer in milliseconds, as sent in `CONNECT`.
    pub fn heartbeat_offer(&self) -> (u64, u64) {
        match self {
            Self::Json => (0, 0),
            Self::Stomp(stomp) => {
                let ms = millis(stomp.heartbeat);
                (ms, ms)
            },
        }
    }

    /// Wire text for an outbound envelope.
    pub fn encode_envelope(&self, envelope: &OutboundEnvelope) -> String {
        match self {
            Self::Json => envelope.to_json(),
            Self::Stomp(stomp) => {
                let destination = format!("{}/{}", stomp.config.send_prefix, envelope.kind);
                stomp.wrap(StompFrame::send(&destination, envelope.payload_json()).encode())
            },
        }
    }

    /// Wire text for a keepalive.
    pub fn heartbeat(&self) -> String {
        match self {
            Self::Json => OutboundEnvelope::ping().to_json(),
            Self::Stomp(stomp) => stomp.wrap("\n".to_string()),
        }
    }

    /// STOMP destination for `topic`, `None` on the JSON transport.
    ///
    /// A topic starting with `/` is taken as a literal destination; anything
    /// else fills the topic template.
    pub fn destination(&self, topic: &str) -> Option<String> {
        match self {
            Self::Json => None,
            Self::Stomp(_) if topic.starts_with('/') => Some(topic.to_string()),
            Self::Stomp(stomp) => {
                Some(stomp.config.topic_template.replace(TOPIC_PLACEHOLDER, topic))
            },
        }
    }

    /// `SUBSCRIBE` text.
    pub fn encode_subscribe(&self, id: &str, destination: &str) -> Option<String> {
        self.stomp().map(|s| s.wrap(StompFrame::subscribe(id, destination).encode()))
    }

    /// `UNSUBSCRIBE` text.
    pub fn encode_unsubscribe(&self, id: &str) -> Option<String> {
        self.stomp().map(|s| s.wrap(StompFrame::unsubscribe(id).encode()))
    }

    /// `DISCONNECT` text.
    pub fn encode_disconnect(&self) -> Option<String> {
        self.stomp().map(|s| s.wrap(StompFrame::disconnect().encode()))
    }

    /// Decode one inbound text frame.
    pub fn decode(&self, text: &str) -> Vec<WireInput> {
        match self {
            Self::Json => vec![match decode_json(text) {
                Ok(inbound) => WireInput::Inbound(inbound),
                Err(err) => WireInput::Invalid(err),
            }],
            Self::Stomp(stomp) if stomp.config.sockjs => stomp.decode_sockjs(text),
            Self::Stomp(stomp) => stomp.decode_stomp(text),
        }
    }

    fn stomp(&self) -> Option<&StompCodec> {
        match self {
            Self::Json => None,
            Self::Stomp(stomp) => Some(stomp),
        }
    }
}

impl StompCodec {
    fn connect_frame(&self) -> String {
        self.wrap(StompFrame::connect(&self.config.host, self.heartbeat, self.heartbeat).encode())
    }

    fn wrap(&self, text: String) -> String {
        if self.config.sockjs { sockjs::encode_messages(&[text]) } else { text }
    }

    fn decode_sockjs(&self, text: &str) -> Vec<WireInput> {
        match SockJsFrame::decode(text) {
            Ok(SockJsFrame::Open) => vec![WireInput::SessionOpen],
            Ok(SockJsFrame::Heartbeat) => vec![WireInput::Heartbeat],
            Ok(SockJsFrame::Messages(messages)) => {
                messages.iter().flat_map(|m| self.decode_stomp(m)).collect()
            },
            Ok(SockJsFrame::Close { code, reason }) => {
                vec![WireInput::ServerClose(format!("sockjs close {code}: {reason}"))]
            },
            Err(err) => vec![WireInput::Invalid(err)],
        }
    }

    fn decode_stomp(&self, text: &str) -> Vec<WireInput> {
        let frames = match StompFrame::decode_all(text) {
            Ok(frames) => frames,
            Err(err) => return vec![WireInput::Invalid(err)],
        };
        if frames.is_empty() {
            return vec![WireInput::Heartbeat];
        }
        frames.into_iter().map(|frame| self.classify(frame)).collect()
    }

    fn classify(&self, frame: StompFrame) -> WireInput {
        match frame.command {
            StompCommand::Connected => {
                let server_heartbeat =
                    frame.header("heart-beat").and_then(parse_heartbeat).unwrap_or((0, 0));
                WireInput::Connected { server_heartbeat }
            },
            StompCommand::Message => {
                let room_id = frame.header("destination").and_then(|d| self.room_id(d));
                match decode_topic_body(room_id, &frame.body) {
                    Ok(inbound) => WireInput::Delivery {
                        subscription: frame.header("subscription").map(str::to_string),
                        inbound,
                    },
                    Err(err) => WireInput::Invalid(err),
                }
            },
            StompCommand::Error => {
                let message = frame
                    .header("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                WireInput::ServerError(message)
            },
            _ => WireInput::Ignored,
        }
    }

    /// Topic name of a destination built from the template.
    fn room_id<'a>(&self, destination: &'a str) -> Option<&'a str> {
        let (prefix, suffix) = self.config.topic_template.split_once(TOPIC_PLACEHOLDER)?;
        destination.strip_prefix(prefix)?.strip_suffix(suffix).filter(|id| !id.is_empty())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

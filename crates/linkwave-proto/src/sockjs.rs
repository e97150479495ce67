//! SockJS framing over a raw WebSocket.
//!
//! Gateways that expose STOMP through SockJS wrap every server message in a
//! one-letter frame:
//!
//! | frame            | meaning                          |
//! |------------------|----------------------------------|
//! | `o`              | session open                     |
//! | `h`              | heartbeat                        |
//! | `a["m1","m2"]`   | one or more messages             |
//! | `c[3000,"bye"]`  | session closed by the server     |
//!
//! Client messages are sent as a JSON array of strings.

use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Alphabet for generated session IDs.
const SESSION_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated session IDs.
pub const SESSION_ID_LEN: usize = 8;

/// Decoded SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    /// Session established.
    Open,
    /// Server keepalive.
    Heartbeat,
    /// Wrapped application messages, in order.
    Messages(Vec<String>),
    /// Server closed the session.
    Close {
        /// SockJS close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl SockJsFrame {
    /// Decode one SockJS text frame.
    ///
    /// # Errors
    ///
    /// `ProtocolError::MalformedSockJs` for unknown prefixes or bodies that
    /// are not the expected JSON arrays.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let prefix = chars.next().ok_or_else(|| malformed("empty frame"))?;
        let body = chars.as_str();

        match prefix {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => {
                let messages: Vec<String> =
                    serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
                Ok(Self::Messages(messages))
            },
            'c' => {
                let parts: Vec<Value> =
                    serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
                let code = parts
                    .first()
                    .and_then(Value::as_u64)
                    .and_then(|c| u16::try_from(c).ok())
                    .ok_or_else(|| malformed("close frame without code"))?;
                let reason = parts.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Self::Close { code, reason })
            },
            other => Err(malformed(format!("unknown frame prefix {other:?}"))),
        }
    }
}

/// Wrap client messages for sending.
pub fn encode_messages<S: AsRef<str>>(messages: &[S]) -> String {
    Value::Array(messages.iter().map(|m| Value::String(m.as_ref().to_string())).collect())
        .to_string()
}

/// Raw WebSocket transport URL for a SockJS endpoint.
///
/// `http`/`https` bases are rewritten to `ws`/`wss`.
pub fn transport_url(base: &str, server_id: u16, session_id: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/{:03}/{session_id}/websocket", server_id % 1000)
}

/// Session ID derived from random bytes.
///
/// Uses the first [`SESSION_ID_LEN`] bytes of `random`.
pub fn session_id(random: &[u8]) -> String {
    random
        .iter()
        .take(SESSION_ID_LEN)
        .map(|b| char::from(SESSION_ALPHABET[usize::from(*b) % SESSION_ALPHABET.len()]))
        .collect()
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedSockJs(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_control_frames() {
        assert_eq!(SockJsFrame::decode("o").unwrap(), SockJsFrame::Open);
        assert_eq!(SockJsFrame::decode("h").unwrap(), SockJsFrame::Heartbeat);
        assert_eq!(
            SockJsFrame::decode(r#"c[3000,"Go away!"]"#).unwrap(),
            SockJsFrame::Close { code: 3000, reason: "Go away!".into() }
        );
    }

    #[test]
    fn decode_message_array() {
        let frame = SockJsFrame::decode(r#"a["CONNECTED\nversion:1.2\n\n\u0000"]"#).unwrap();
        assert_eq!(
            frame,
            SockJsFrame::Messages(vec!["CONNECTED\nversion:1.2\n\n\0".to_string()])
        );
    }

    #[test]
    fn reject_garbage() {
        assert!(SockJsFrame::decode("").is_err());
        assert!(SockJsFrame::decode("x").is_err());
        assert!(SockJsFrame::decode("a{").is_err());
        assert!(SockJsFrame::decode("c[]").is_err());
    }

    #[test]
    fn encode_wraps_in_array() {
        let text = encode_messages(&["SEND\n\n\0"]);
        assert_eq!(text, r#"["SEND\n\n\u0000"]"#);
    }

    #[test]
    fn transport_url_rewrites_scheme() {
        assert_eq!(
            transport_url("http://localhost:8080/ws/chat/", 7, "abcd1234"),
            "ws://localhost:8080/ws/chat/007/abcd1234/websocket"
        );
        assert_eq!(
            transport_url("https://chat.example/ws", 123, "zz"),
            "wss://chat.example/ws/123/zz/websocket"
        );
    }

    #[test]
    fn session_id_uses_alphabet() {
        let id = session_id(&[0, 1, 25, 26, 35, 36, 255, 100, 9]);
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(id.starts_with("abz0"));
    }
}

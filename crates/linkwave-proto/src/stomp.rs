//! STOMP 1.2 text frame codec.
//!
//! A frame is a command line, zero or more `name:value` header lines, a blank
//! line, the body, and a NUL terminator:
//!
//! ```text
//! SEND
//! destination:/app/chat.send
//! content-type:application/json
//!
//! {"roomId":"1","body":"hi"}^@
//! ```
//!
//! A bare EOL between frames is a heart-beat. Header names and values are
//! escaped (`\\`, `\n`, `\r`, `\c`) in every frame except `CONNECT` and
//! `CONNECTED`. When `content-length` is present the body is exactly that many
//! bytes; otherwise it runs to the first NUL.
//!
//! # Invariants
//!
//! - Decoding never panics; every malformed input maps to a
//!   [`ProtocolError`].
//! - The first occurrence of a repeated header wins.

use std::time::Duration;

use crate::errors::{ProtocolError, Result};

/// Protocol version we negotiate.
pub const STOMP_VERSION: &str = "1.2";

/// STOMP frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    /// Client handshake
    Connect,
    /// Client handshake (1.2 alias)
    Stomp,
    /// Server handshake reply
    Connected,
    /// Publish to a destination
    Send,
    /// Open a subscription
    Subscribe,
    /// Close a subscription
    Unsubscribe,
    /// Acknowledge a message
    Ack,
    /// Reject a message
    Nack,
    /// Start a transaction
    Begin,
    /// Commit a transaction
    Commit,
    /// Roll back a transaction
    Abort,
    /// Graceful client shutdown
    Disconnect,
    /// Message pushed on a subscription
    Message,
    /// Receipt for a client frame
    Receipt,
    /// Server-side failure, connection closes afterwards
    Error,
}

impl StompCommand {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a wire name.
    ///
    /// # Errors
    ///
    /// `ProtocolError::UnknownCommand` for anything outside STOMP 1.2.
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        })
    }

    /// Handshake frames carry raw (unescaped) headers.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Frame body (UTF-8 text; this client never sends binary bodies).
    pub body: String,
}

impl StompFrame {
    /// Frame with no headers and no body.
    pub fn new(command: StompCommand) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// `CONNECT` with version negotiation and heart-beat offer.
    ///
    /// `send_every` is how often we promise to send, `expect_every` how often
    /// we want to hear from the server. Zero disables that direction.
    pub fn connect(host: &str, send_every: Duration, expect_every: Duration) -> Self {
        Self::new(StompCommand::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", host)
            .with_header(
                "heart-beat",
                format!("{},{}", send_every.as_millis(), expect_every.as_millis()),
            )
    }

    /// `SEND` of a JSON body.
    pub fn send(destination: &str, body: String) -> Self {
        Self::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", body.len().to_string())
            .with_body(body)
    }

    /// `SUBSCRIBE` with automatic acknowledgement.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `UNSUBSCRIBE` of a subscription ID.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    /// `DISCONNECT`.
    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// Serialize to wire text, including the NUL terminator.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);

        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                escape_into(&mut out, name);
                out.push(':');
                escape_into(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in `text`, skipping heart-beat EOLs.
    ///
    /// An empty result means the text held only heart-beats.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` for a bad command line
    /// - `ProtocolError::MalformedStomp` for broken headers, bad escapes,
    ///   a wrong `content-length`, or a missing NUL terminator
    pub fn decode_all(text: &str) -> Result<Vec<Self>> {
        let mut frames = Vec::new();
        let mut rest = text;

        loop {
            rest = rest.trim_start_matches(&['\n', '\r'][..]);
            if rest.is_empty() {
                break;
            }
            let (frame, tail) = Self::decode_one(rest)?;
            frames.push(frame);
            rest = tail;
        }

        Ok(frames)
    }

    fn decode_one(text: &str) -> Result<(Self, &str)> {
        let (command_line, mut rest) = split_line(text)?;
        let command = StompCommand::parse(command_line)?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, tail) = split_line(rest)?;
            rest = tail;
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(malformed(format!("header without colon: {line:?}")));
            };
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let frame = Self { command, headers, body: String::new() };

        let body_len = match frame.header("content-length") {
            Some(len) => len
                .trim()
                .parse::<usize>()
                .map_err(|_| malformed(format!("bad content-length: {len:?}")))?,
            None => rest.find('\0').ok_or_else(|| malformed("missing NUL terminator"))?,
        };

        let body = rest
            .get(..body_len)
            .ok_or_else(|| malformed("content-length exceeds frame"))?;
        let tail = rest
            .get(body_len..)
            .and_then(|t| t.strip_prefix('\0'))
            .ok_or_else(|| malformed("body not followed by NUL"))?;

        Ok((Self { body: body.to_string(), ..frame }, tail))
    }
}

/// Negotiated heart-beat intervals `(outgoing, incoming)`.
///
/// `client` is our `CONNECT` offer and `server` the `heart-beat` header of
/// `CONNECTED`, both as `(send_every_ms, expect_every_ms)`. `None` means that
/// direction is disabled.
pub fn negotiate_heartbeat(
    client: (u64, u64),
    server: (u64, u64),
) -> (Option<Duration>, Option<Duration>) {
    let (cx, cy) = client;
    let (sx, sy) = server;

    let outgoing = (cx != 0 && sy != 0).then(|| Duration::from_millis(cx.max(sy)));
    let incoming = (sx != 0 && cy != 0).then(|| Duration::from_millis(sx.max(cy)));
    (outgoing, incoming)
}

/// Parse a `heart-beat` header value (`"x,y"`).
pub fn parse_heartbeat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn split_line(text: &str) -> Result<(&str, &str)> {
    let Some(idx) = text.find('\n') else {
        return Err(malformed("unterminated header block"));
    };
    let line = &text[..idx];
    Ok((line.strip_suffix('\r').unwrap_or(line), &text[idx + 1..]))
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => return Err(malformed(format!("undefined escape: \\{other:?}"))),
        }
    }
    Ok(out)
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedStomp(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_send_frame() {
        let frame = StompFrame::send("/app/chat.send", r#"{"body":"hi"}"#.to_string());
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.send\ncontent-type:application/json\ncontent-length:13\n\n{\"body\":\"hi\"}\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = StompFrame::connect("chat.local:8080", Duration::from_secs(4), Duration::ZERO);
        let text = frame.encode();
        assert!(text.contains("host:chat.local:8080\n"));
        assert!(text.contains("heart-beat:4000,0\n"));
    }

    #[test]
    fn decode_message_without_content_length() {
        let text = "MESSAGE\nsubscription:sub-0\ndestination:/topic/room.1\n\n{\"a\":1}\0";
        let frames = StompFrame::decode_all(text).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, StompCommand::Message);
        assert_eq!(frames[0].header("subscription"), Some("sub-0"));
        assert_eq!(frames[0].body, "{\"a\":1}");
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let text = "MESSAGE\ncontent-length:3\n\na\0b\0\n";
        let frames = StompFrame::decode_all(text).unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn heartbeats_only() {
        assert!(StompFrame::decode_all("\n").unwrap().is_empty());
        assert!(StompFrame::decode_all("\r\n\n").unwrap().is_empty());
    }

    #[test]
    fn crlf_lines_and_multiple_frames() {
        let text = "CONNECTED\r\nversion:1.2\r\n\r\n\0\nRECEIPT\nreceipt-id:7\n\n\0";
        let frames = StompFrame::decode_all(text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header("version"), Some("1.2"));
        assert_eq!(frames[1].command, StompCommand::Receipt);
    }

    #[test]
    fn escaped_headers_decode() {
        let text = "ERROR\nmessage:bad\\cthing\\nhappened\n\n\0";
        let frames = StompFrame::decode_all(text).unwrap();
        assert_eq!(frames[0].header("message"), Some("bad:thing\nhappened"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let text = "MESSAGE\nfoo:1\nfoo:2\n\n\0";
        let frames = StompFrame::decode_all(text).unwrap();
        assert_eq!(frames[0].header("foo"), Some("1"));
    }

    #[test]
    fn malformed_inputs_are_errors() {
        assert!(matches!(
            StompFrame::decode_all("HELLO\n\n\0"),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(StompFrame::decode_all("MESSAGE\nnocolon\n\n\0").is_err());
        assert!(StompFrame::decode_all("MESSAGE\n\nbody without nul").is_err());
        assert!(StompFrame::decode_all("MESSAGE\ncontent-length:99\n\nshort\0").is_err());
        assert!(StompFrame::decode_all("MESSAGE\nbad:\\x\n\n\0").is_err());
    }

    #[test]
    fn heartbeat_negotiation() {
        let (out, inc) = negotiate_heartbeat((4000, 4000), (10000, 0));
        assert_eq!(out, None);
        assert_eq!(inc, Some(Duration::from_millis(10000)));

        let (out, _) = negotiate_heartbeat((4000, 4000), (0, 5000));
        assert_eq!(out, Some(Duration::from_millis(5000)));

        assert_eq!(parse_heartbeat("10, 20"), Some((10, 20)));
        assert_eq!(parse_heartbeat("nope"), None);
    }
}

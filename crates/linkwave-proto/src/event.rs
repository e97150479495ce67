//! Inbound events and the JSON frame decoder.
//!
//! The gateway speaks an ad hoc JSON dialect that changed between releases:
//! the discriminator is `type` (or `event` on older ack frames), and event
//! fields sit either inside a `payload` object or at the top level. The
//! decoder accepts both shapes and the field aliases seen in the wild, and
//! maps every recognized frame to exactly one [`Inbound`] value.
//!
//! Frames that cannot be mapped are reported as [`ProtocolError`]; the caller
//! logs and drops them.

use serde_json::{Map, Value};

use crate::errors::{ProtocolError, Result};

/// Online/offline status of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceStatus {
    /// Contact has at least one live session.
    Online,
    /// Contact has no live session.
    Offline,
}

/// Chat message delivered to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Gateway-assigned message ID.
    pub message_id: String,
    /// Sender user ID.
    pub from: String,
    /// Recipient user ID, when the gateway includes it.
    pub to: Option<String>,
    /// Room/conversation the message belongs to, when known.
    pub room_id: Option<String>,
    /// Message text.
    pub body: String,
    /// Send time in Unix milliseconds.
    pub timestamp: Option<i64>,
}

/// Typed event delivered to registered handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A chat message arrived.
    ChatMessage(ChatMessage),

    /// A contact went online or offline.
    PresenceChanged {
        /// Contact user ID.
        user_id: String,
        /// New status.
        status: PresenceStatus,
        /// Last activity in Unix milliseconds.
        last_seen: Option<i64>,
    },

    /// A contact started typing.
    TypingStarted {
        /// Typing user ID.
        from: String,
        /// Room the typing happens in, when known.
        room_id: Option<String>,
    },

    /// A contact stopped typing.
    TypingStopped {
        /// Typing user ID.
        from: String,
        /// Room the typing happened in, when known.
        room_id: Option<String>,
    },

    /// A contact read one or more messages.
    ReadReceipt {
        /// User who read the messages.
        reader_id: String,
        /// Room the messages belong to, when known.
        room_id: Option<String>,
        /// Messages that were read.
        message_ids: Vec<String>,
        /// Read time in Unix milliseconds.
        timestamp: Option<i64>,
    },

    /// The transport connection is established and usable.
    ConnectionOpened,

    /// The transport connection went away.
    ConnectionClosed {
        /// Human-readable cause.
        reason: String,
    },
}

/// Payload-free tag of an [`InboundEvent`], used to key handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// [`InboundEvent::ChatMessage`]
    ChatMessage,
    /// [`InboundEvent::PresenceChanged`]
    PresenceChanged,
    /// [`InboundEvent::TypingStarted`]
    TypingStarted,
    /// [`InboundEvent::TypingStopped`]
    TypingStopped,
    /// [`InboundEvent::ReadReceipt`]
    ReadReceipt,
    /// [`InboundEvent::ConnectionOpened`]
    ConnectionOpened,
    /// [`InboundEvent::ConnectionClosed`]
    ConnectionClosed,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::ChatMessage,
        Self::PresenceChanged,
        Self::TypingStarted,
        Self::TypingStopped,
        Self::ReadReceipt,
        Self::ConnectionOpened,
        Self::ConnectionClosed,
    ];

    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatMessage => "chat.message",
            Self::PresenceChanged => "presence.changed",
            Self::TypingStarted => "typing.started",
            Self::TypingStopped => "typing.stopped",
            Self::ReadReceipt => "read.receipt",
            Self::ConnectionOpened => "connection.opened",
            Self::ConnectionClosed => "connection.closed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InboundEvent {
    /// Handler key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChatMessage(_) => EventKind::ChatMessage,
            Self::PresenceChanged { .. } => EventKind::PresenceChanged,
            Self::TypingStarted { .. } => EventKind::TypingStarted,
            Self::TypingStopped { .. } => EventKind::TypingStopped,
            Self::ReadReceipt { .. } => EventKind::ReadReceipt,
            Self::ConnectionOpened => EventKind::ConnectionOpened,
            Self::ConnectionClosed { .. } => EventKind::ConnectionClosed,
        }
    }
}

/// Gateway frames that only matter to the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Reply to our ping.
    Pong,
    /// Gateway accepted the session.
    ConnectionAck,
    /// Gateway acknowledged one of our sends.
    Ack {
        /// Tag of the ack frame.
        event: String,
    },
}

/// Result of decoding one JSON frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Event for the application.
    Event(InboundEvent),
    /// Housekeeping frame for the manager.
    Control(Control),
}

/// Decode a JSON text frame.
///
/// # Errors
///
/// - `ProtocolError::InvalidJson` if `text` is not a JSON object
/// - `ProtocolError::MissingType` if there is no discriminator
/// - `ProtocolError::UnknownType` for unrecognized tags
/// - `ProtocolError::MissingField` / `InvalidField` for broken events
pub fn decode_json(text: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(&value)
}

/// Decode an already-parsed JSON frame.
///
/// # Errors
///
/// Same as [`decode_json`], except for JSON syntax errors.
pub fn decode_value(value: &Value) -> Result<Inbound> {
    let Some(obj) = value.as_object() else {
        return Err(ProtocolError::InvalidJson("frame is not an object".to_string()));
    };

    let tag = obj
        .get("type")
        .or_else(|| obj.get("event"))
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    let fields = match obj.get("payload") {
        Some(Value::Object(inner)) => Fields { event: tag, obj: inner },
        _ => Fields { event: tag, obj },
    };

    let inbound = match tag {
        "chat.receive" | "chat.message" | "MESSAGE" => {
            Inbound::Event(InboundEvent::ChatMessage(fields.chat_message()?))
        },
        "presence.update" | "PRESENCE" => Inbound::Event(fields.presence()?),
        "typing.start" => Inbound::Event(fields.typing(true)?),
        "typing.stop" => Inbound::Event(fields.typing(false)?),
        "typing.event" => {
            let started = match fields.string(&["action"]).as_deref() {
                Some("start") => true,
                Some("stop") => false,
                Some(_) => return Err(fields.invalid("action")),
                None => return Err(fields.missing("action")),
            };
            Inbound::Event(fields.typing(started)?)
        },
        "TYPING" => {
            let started = fields.obj.get("isTyping").and_then(Value::as_bool).unwrap_or(true);
            Inbound::Event(fields.typing(started)?)
        },
        "read.update" | "read.receipt" | "READ_RECEIPT" => Inbound::Event(fields.read_receipt()?),
        "pong" => Inbound::Control(Control::Pong),
        "connection.ack" => Inbound::Control(Control::ConnectionAck),
        "chat.sent" | "message.ack" | "presence.heartbeat.ack" => {
            Inbound::Control(Control::Ack { event: tag.to_string() })
        },
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };

    Ok(inbound)
}

/// Decode the body of a message pushed on a room topic.
///
/// Room topics carry bare chat messages without a discriminator. Bodies
/// that do carry one go through [`decode_value`].
///
/// # Errors
///
/// Same as [`decode_json`].
pub fn decode_topic_body(room_id: Option<&str>, body: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(body)?;
    let Some(obj) = value.as_object() else {
        return Err(ProtocolError::InvalidJson("message body is not an object".to_string()));
    };

    if obj.contains_key("type") || obj.contains_key("event") {
        return decode_value(&value);
    }

    let fields = Fields { event: "room.message", obj };
    let mut message = fields.chat_message()?;
    if message.room_id.is_none() {
        message.room_id = room_id.map(str::to_string);
    }
    Ok(Inbound::Event(InboundEvent::ChatMessage(message)))
}

/// Field accessor over one event object.
struct Fields<'a> {
    event: &'a str,
    obj: &'a Map<String, Value>,
}

impl Fields<'_> {
    /// First present alias, as a string. Numeric IDs are stringified.
    fn string(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| match self.obj.get(*name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    fn require(&self, names: &[&str], field: &'static str) -> Result<String> {
        self.string(names).ok_or_else(|| self.missing(field))
    }

    /// First present alias as Unix milliseconds.
    fn millis(&self, names: &[&str]) -> Option<i64> {
        names.iter().find_map(|name| match self.obj.get(*name) {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        })
    }

    fn missing(&self, field: &'static str) -> ProtocolError {
        ProtocolError::MissingField { event: self.event.to_string(), field }
    }

    fn invalid(&self, field: &'static str) -> ProtocolError {
        ProtocolError::InvalidField { event: self.event.to_string(), field }
    }

    fn chat_message(&self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            message_id: self.require(&["messageId", "id"], "messageId")?,
            from: self.require(&["from", "senderId", "sender"], "from")?,
            to: self.string(&["to", "recipient", "recipientId"]),
            room_id: self.string(&["roomId", "conversationId"]),
            body: self.require(&["body", "content"], "body")?,
            timestamp: self.millis(&["timestamp", "sentAt"]),
        })
    }

    fn presence(&self) -> Result<InboundEvent> {
        let user_id = self.require(&["userId", "user"], "userId")?;
        let status = match self.require(&["status"], "status")?.to_ascii_lowercase().as_str() {
            "online" => PresenceStatus::Online,
            "offline" => PresenceStatus::Offline,
            _ => return Err(self.invalid("status")),
        };
        Ok(InboundEvent::PresenceChanged { user_id, status, last_seen: self.millis(&["lastSeen"]) })
    }

    fn typing(&self, started: bool) -> Result<InboundEvent> {
        let from = self.require(&["from", "senderId", "userId"], "from")?;
        let room_id = self.string(&["roomId", "conversationId"]);
        Ok(if started {
            InboundEvent::TypingStarted { from, room_id }
        } else {
            InboundEvent::TypingStopped { from, room_id }
        })
    }

    fn read_receipt(&self) -> Result<InboundEvent> {
        let reader_id = self.require(&["readBy", "readerId", "userId"], "readBy")?;

        let message_ids: Vec<String> = match self.obj.get("messageIds") {
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(_) => return Err(self.invalid("messageIds")),
            None => self.string(&["messageId"]).into_iter().collect(),
        };

        if message_ids.is_empty() {
            return Err(self.missing("messageIds"));
        }

        Ok(InboundEvent::ReadReceipt {
            reader_id,
            room_id: self.string(&["roomId", "conversationId"]),
            message_ids,
            timestamp: self.millis(&["timestamp", "readAt"]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_chat_receive() {
        let text = r#"{"type":"chat.receive","messageId":"m1","from":"u2","body":"hi","timestamp":1700000000000}"#;
        let Inbound::Event(InboundEvent::ChatMessage(msg)) = decode_json(text).unwrap() else {
            panic!("expected chat message");
        };
        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.from, "u2");
        assert_eq!(msg.body, "hi");
        assert_eq!(msg.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn enveloped_chat_message() {
        let text = r#"{"type":"MESSAGE","payload":{"id":"7","senderId":"u9","content":"yo","conversationId":"c1"}}"#;
        let Inbound::Event(InboundEvent::ChatMessage(msg)) = decode_json(text).unwrap() else {
            panic!("expected chat message");
        };
        assert_eq!(msg.message_id, "7");
        assert_eq!(msg.room_id.as_deref(), Some("c1"));
    }

    #[test]
    fn presence_update() {
        let text = r#"{"type":"presence.update","userId":"u2","status":"offline","lastSeen":42}"#;
        assert_eq!(
            decode_json(text).unwrap(),
            Inbound::Event(InboundEvent::PresenceChanged {
                user_id: "u2".into(),
                status: PresenceStatus::Offline,
                last_seen: Some(42),
            })
        );
    }

    #[test]
    fn presence_with_unknown_status_is_rejected() {
        let text = r#"{"type":"presence.update","userId":"u2","status":"away"}"#;
        assert!(matches!(decode_json(text), Err(ProtocolError::InvalidField { field: "status", .. })));
    }

    #[test]
    fn typing_event_with_action() {
        let text = r#"{"type":"typing.event","action":"stop","senderId":"u3","roomId":"r1"}"#;
        assert_eq!(
            decode_json(text).unwrap(),
            Inbound::Event(InboundEvent::TypingStopped {
                from: "u3".into(),
                room_id: Some("r1".into()),
            })
        );
    }

    #[test]
    fn legacy_typing_flag() {
        let text = r#"{"type":"TYPING","payload":{"userId":"u3","conversationId":"c","isTyping":true}}"#;
        assert!(matches!(
            decode_json(text).unwrap(),
            Inbound::Event(InboundEvent::TypingStarted { .. })
        ));
    }

    #[test]
    fn read_update_with_id_list() {
        let text = r#"{"type":"read.update","readBy":"u2","messageIds":["a","b"]}"#;
        let Inbound::Event(InboundEvent::ReadReceipt { message_ids, .. }) =
            decode_json(text).unwrap()
        else {
            panic!("expected read receipt");
        };
        assert_eq!(message_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn read_receipt_single_id() {
        let text = r#"{"type":"read.receipt","roomId":"r","messageId":"m","readerId":"u","timestamp":5}"#;
        assert!(matches!(
            decode_json(text).unwrap(),
            Inbound::Event(InboundEvent::ReadReceipt { timestamp: Some(5), .. })
        ));
    }

    #[test]
    fn ack_frames_use_event_discriminator() {
        assert_eq!(
            decode_json(r#"{"event":"connection.ack","status":"connected"}"#).unwrap(),
            Inbound::Control(Control::ConnectionAck)
        );
        assert_eq!(
            decode_json(r#"{"event":"pong","timestamp":1}"#).unwrap(),
            Inbound::Control(Control::Pong)
        );
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert_eq!(
            decode_json(r#"{"type":"weather.report"}"#),
            Err(ProtocolError::UnknownType("weather.report".into()))
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(decode_json("not json"), Err(ProtocolError::InvalidJson(_))));
        assert!(matches!(decode_json("[1,2]"), Err(ProtocolError::InvalidJson(_))));
        assert_eq!(decode_json(r#"{"payload":{}}"#), Err(ProtocolError::MissingType));
    }

    #[test]
    fn bare_topic_body_becomes_room_message() {
        let body = r#"{"id":"m1","senderId":"u1","body":"hello","timestamp":3}"#;
        let Inbound::Event(InboundEvent::ChatMessage(msg)) =
            decode_topic_body(Some("42"), body).unwrap()
        else {
            panic!("expected chat message");
        };
        assert_eq!(msg.room_id.as_deref(), Some("42"));
        assert_eq!(msg.from, "u1");
    }

    #[test]
    fn every_kind_has_distinct_name() {
        let mut names: Vec<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
    }
}

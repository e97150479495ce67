//! Outbound event envelope.
//!
//! Everything the client sends to the gateway is an [`OutboundEnvelope`]:
//! a string tag plus an opaque JSON payload. On the plain WebSocket transport
//! the envelope is sent verbatim as `{"type": .., "payload": ..}`. On STOMP
//! the tag selects the destination and the payload becomes the frame body.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Tag of a chat message send.
pub const CHAT_SEND: &str = "chat.send";
/// Tag of a typing-started notification.
pub const TYPING_START: &str = "typing.start";
/// Tag of a typing-stopped notification.
pub const TYPING_STOP: &str = "typing.stop";
/// Tag of a read-up-to marker.
pub const READ_UP_TO: &str = "read.up_to";
/// Tag of a presence keepalive.
pub const PRESENCE_HEARTBEAT: &str = "presence.heartbeat";
/// Tag of a transport keepalive.
pub const PING: &str = "ping";

/// Client-to-gateway message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Event tag, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload. Opaque to the connection manager.
    #[serde(default)]
    pub payload: Value,
}

impl OutboundEnvelope {
    /// Create an envelope from a tag and payload.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload }
    }

    /// Send `body` to the user `to`.
    pub fn chat(to: &str, body: &str) -> Self {
        Self::new(CHAT_SEND, json!({ "to": to, "body": body }))
    }

    /// Send `body` to a room (topic-oriented gateways).
    pub fn room_chat(room_id: &str, body: &str) -> Self {
        Self::new(CHAT_SEND, json!({ "roomId": room_id, "body": body }))
    }

    /// Tell `to` that we started typing.
    pub fn typing_start(to: &str) -> Self {
        Self::new(TYPING_START, json!({ "to": to }))
    }

    /// Tell `to` that we stopped typing.
    pub fn typing_stop(to: &str) -> Self {
        Self::new(TYPING_STOP, json!({ "to": to }))
    }

    /// Mark every message in `room_id` up to `message_id` as read.
    pub fn read_up_to(room_id: &str, message_id: &str) -> Self {
        Self::new(READ_UP_TO, json!({ "roomId": room_id, "messageId": message_id }))
    }

    /// Presence keepalive.
    pub fn presence_heartbeat() -> Self {
        Self::new(PRESENCE_HEARTBEAT, Value::Null)
    }

    /// Transport keepalive.
    pub fn ping() -> Self {
        Self::new(PING, Value::Null)
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> String {
        json!({ "type": self.kind, "payload": self.payload }).to_string()
    }

    /// Payload as the JSON text used for STOMP `SEND` bodies.
    pub fn payload_json(&self) -> String {
        self.payload.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_envelope_wire_shape() {
        let env = OutboundEnvelope::chat("u2", "hi");
        let value: Value = serde_json::from_str(&env.to_json()).unwrap();

        assert_eq!(value["type"], "chat.send");
        assert_eq!(value["payload"]["to"], "u2");
        assert_eq!(value["payload"]["body"], "hi");
    }

    #[test]
    fn wire_text_parses_back_to_same_envelope() {
        let env = OutboundEnvelope::read_up_to("room-1", "m-9");
        let parsed: OutboundEnvelope = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn heartbeat_has_null_payload() {
        let value: Value = serde_json::from_str(&OutboundEnvelope::ping().to_json()).unwrap();
        assert_eq!(value, json!({ "type": "ping", "payload": null }));
    }
}

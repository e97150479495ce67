//! Scripted chat gateway.
//!
//! `SimGateway` plays the server side of one connection at a time. It speaks
//! the same dialect as the client under test (plain JSON, STOMP, or STOMP
//! over SockJS), answers handshakes and pings, records every application
//! envelope it receives, and tracks live STOMP subscriptions so tests can
//! publish room messages and count deliveries.
//!
//! Failure injection: refuse or stall upcoming opens, fall silent, or send a
//! STOMP `ERROR` frame.

use std::collections::BTreeMap;

use linkwave_core::{ManagerConfig, StompConfig, TransportConfig, config::TOPIC_PLACEHOLDER};
use linkwave_proto::{OutboundEnvelope, StompCommand, StompFrame, envelope::PING, sockjs};
use serde_json::Value;

/// Wire dialect spoken by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `{type, payload}` JSON frames.
    Json,
    /// STOMP frames on a raw WebSocket.
    Stomp,
    /// STOMP frames wrapped in SockJS.
    SockJs,
}

/// What happens to the next transport open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Socket is up; deliver these frames after the open.
    Accepted(Vec<String>),
    /// Connect failed with this reason.
    Refused(String),
    /// Connect never completes.
    Stalled,
}

#[derive(Debug)]
struct Session {
    generation: u64,
    subscriptions: BTreeMap<String, String>,
}

/// Server side of the simulated connection.
#[derive(Debug)]
pub struct SimGateway {
    dialect: Dialect,
    send_prefix: String,
    topic_template: String,
    server_heartbeat: (u64, u64),
    session: Option<Session>,
    refuse_opens: u32,
    stall_opens: u32,
    silent: bool,
    accepted: u32,
    received: Vec<OutboundEnvelope>,
    heartbeats: usize,
    next_message_id: u64,
}

impl SimGateway {
    /// Gateway speaking `dialect` with the default STOMP destinations.
    pub fn new(dialect: Dialect) -> Self {
        let stomp = StompConfig::default();
        Self {
            dialect,
            send_prefix: stomp.send_prefix,
            topic_template: stomp.topic_template,
            server_heartbeat: (0, 0),
            session: None,
            refuse_opens: 0,
            stall_opens: 0,
            silent: false,
            accepted: 0,
            received: Vec::new(),
            heartbeats: 0,
            next_message_id: 0,
        }
    }

    /// Gateway matching the transport of `config`.
    pub fn for_config(config: &ManagerConfig) -> Self {
        match &config.transport {
            TransportConfig::Json => Self::new(Dialect::Json),
            TransportConfig::Stomp(stomp) => {
                let dialect = if stomp.sockjs { Dialect::SockJs } else { Dialect::Stomp };
                let mut gateway = Self::new(dialect);
                gateway.send_prefix.clone_from(&stomp.send_prefix);
                gateway.topic_template.clone_from(&stomp.topic_template);
                gateway
            },
        }
    }

    /// Heart-beat header the gateway answers `CONNECT` with, in
    /// milliseconds `(server sends, server expects)`.
    #[must_use]
    pub fn with_server_heartbeat(mut self, heartbeat: (u64, u64)) -> Self {
        self.server_heartbeat = heartbeat;
        self
    }

    /// Dialect spoken.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Refuse the next `count` opens.
    pub fn refuse_next_opens(&mut self, count: u32) {
        self.refuse_opens = count;
    }

    /// Never complete the next `count` opens.
    pub fn stall_next_opens(&mut self, count: u32) {
        self.stall_opens = count;
    }

    /// Stop answering and stop delivering; the socket stays up.
    pub fn fall_silent(&mut self) {
        self.silent = true;
    }

    /// Whether the gateway has gone silent.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Handle a transport open for `generation`.
    pub fn accept(&mut self, generation: u64) -> OpenOutcome {
        if self.refuse_opens > 0 {
            self.refuse_opens -= 1;
            return OpenOutcome::Refused("connection refused".to_string());
        }
        if self.stall_opens > 0 {
            self.stall_opens -= 1;
            return OpenOutcome::Stalled;
        }

        self.accepted += 1;
        self.silent = false;
        self.session = Some(Session { generation, subscriptions: BTreeMap::new() });
        tracing::debug!(generation, "gateway accepted socket");

        match self.dialect {
            Dialect::SockJs => OpenOutcome::Accepted(vec!["o".to_string()]),
            Dialect::Json | Dialect::Stomp => OpenOutcome::Accepted(Vec::new()),
        }
    }

    /// Drop the current socket.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(generation = session.generation, "gateway closed socket");
        }
    }

    /// Generation of the open socket.
    pub fn generation(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.generation)
    }

    /// Sockets accepted so far.
    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    /// Handle a client frame, returning the gateway's replies.
    pub fn receive(&mut self, text: &str) -> Vec<String> {
        if self.session.is_none() || self.silent {
            return Vec::new();
        }
        match self.dialect {
            Dialect::Json => self.receive_json(text),
            Dialect::Stomp => self.receive_stomp(text),
            Dialect::SockJs => {
                let Ok(messages) = serde_json::from_str::<Vec<String>>(text) else {
                    tracing::warn!(text, "gateway got non-SockJS client frame");
                    return Vec::new();
                };
                let replies: Vec<String> =
                    messages.iter().flat_map(|m| self.receive_stomp(m)).collect();
                if replies.is_empty() {
                    Vec::new()
                } else {
                    vec![format!("a{}", sockjs::encode_messages(&replies))]
                }
            },
        }
    }

    /// Application envelopes received, oldest first.
    pub fn received(&self) -> &[OutboundEnvelope] {
        &self.received
    }

    /// Client keepalives received.
    pub fn heartbeats(&self) -> usize {
        self.heartbeats
    }

    /// Live STOMP subscriptions as `(id, destination)`.
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.session
            .iter()
            .flat_map(|s| s.subscriptions.iter())
            .map(|(id, dest)| (id.clone(), dest.clone()))
            .collect()
    }

    /// Publish a chat message on a room topic.
    ///
    /// Returns one `MESSAGE` per live subscription on that room, so a
    /// duplicated subscription shows up as a duplicated delivery.
    pub fn publish_room(&mut self, room_id: &str, body: &str) -> Vec<String> {
        if self.silent {
            return Vec::new();
        }
        let destination = self.topic_template.replace(TOPIC_PLACEHOLDER, room_id);
        let ids: Vec<String> = self
            .session
            .iter()
            .flat_map(|s| s.subscriptions.iter())
            .filter(|(_, dest)| **dest == destination)
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .map(|id| {
                let message_id = self.allocate_message_id();
                let frame = StompFrame::new(StompCommand::Message)
                    .with_header("destination", destination.as_str())
                    .with_header("subscription", id)
                    .with_header("message-id", message_id)
                    .with_header("content-type", "application/json")
                    .with_body(body);
                self.wrap(frame.encode())
            })
            .collect()
    }

    /// Frame pushing a typed JSON event to the client.
    ///
    /// `None` while silent or without a socket.
    pub fn push_event(&mut self, event: &Value) -> Option<String> {
        if self.silent || self.session.is_none() {
            return None;
        }
        let json = event.to_string();
        Some(match self.dialect {
            Dialect::Json => json,
            Dialect::Stomp | Dialect::SockJs => {
                let message_id = self.allocate_message_id();
                let frame = StompFrame::new(StompCommand::Message)
                    .with_header("destination", "/user/queue/events")
                    .with_header("subscription", "user")
                    .with_header("message-id", message_id)
                    .with_body(json);
                self.wrap(frame.encode())
            },
        })
    }

    /// STOMP `ERROR` frame; `None` on the JSON dialect.
    pub fn error_frame(&self, message: &str) -> Option<String> {
        match self.dialect {
            Dialect::Json => None,
            Dialect::Stomp | Dialect::SockJs => {
                let frame = StompFrame::new(StompCommand::Error).with_header("message", message);
                Some(self.wrap(frame.encode()))
            },
        }
    }

    /// Server keepalive frame.
    pub fn heartbeat_frame(&self) -> String {
        match self.dialect {
            Dialect::Json => r#"{"type":"pong"}"#.to_string(),
            Dialect::Stomp => "\n".to_string(),
            Dialect::SockJs => "h".to_string(),
        }
    }

    fn receive_json(&mut self, text: &str) -> Vec<String> {
        let envelope: OutboundEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "gateway got undecodable JSON");
                return Vec::new();
            },
        };
        if envelope.kind == PING {
            self.heartbeats += 1;
            return vec![self.heartbeat_frame()];
        }
        self.received.push(envelope);
        Vec::new()
    }

    fn receive_stomp(&mut self, text: &str) -> Vec<String> {
        let frames = match StompFrame::decode_all(text) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "gateway got undecodable STOMP");
                return Vec::new();
            },
        };
        if frames.is_empty() {
            self.heartbeats += 1;
            // A gateway that promised heart-beats answers each one in kind.
            return if self.server_heartbeat.0 > 0 { vec!["\n".to_string()] } else { Vec::new() };
        }

        let mut replies = Vec::new();
        for frame in frames {
            match frame.command {
                StompCommand::Connect | StompCommand::Stomp => {
                    let (sends, expects) = self.server_heartbeat;
                    let connected = StompFrame::new(StompCommand::Connected)
                        .with_header("version", "1.2")
                        .with_header("heart-beat", format!("{sends},{expects}"));
                    replies.push(connected.encode());
                },
                StompCommand::Subscribe => {
                    if let (Some(id), Some(dest), Some(session)) =
                        (frame.header("id"), frame.header("destination"), self.session.as_mut())
                    {
                        session.subscriptions.insert(id.to_string(), dest.to_string());
                    }
                },
                StompCommand::Unsubscribe => {
                    if let (Some(id), Some(session)) = (frame.header("id"), self.session.as_mut())
                    {
                        session.subscriptions.remove(id);
                    }
                },
                StompCommand::Send => {
                    let kind = frame
                        .header("destination")
                        .and_then(|d| d.strip_prefix(self.send_prefix.as_str()))
                        .map(|d| d.trim_start_matches('/').to_string())
                        .unwrap_or_default();
                    let payload = serde_json::from_str(&frame.body).unwrap_or(Value::Null);
                    self.received.push(OutboundEnvelope::new(kind, payload));
                },
                StompCommand::Disconnect => tracing::debug!("gateway got DISCONNECT"),
                other => tracing::debug!(command = other.as_str(), "gateway ignoring frame"),
            }
        }
        replies
    }

    fn wrap(&self, stomp: String) -> String {
        match self.dialect {
            Dialect::SockJs => format!("a{}", sockjs::encode_messages(&[stomp])),
            Dialect::Json | Dialect::Stomp => stomp,
        }
    }

    fn allocate_message_id(&mut self) -> String {
        self.next_message_id += 1;
        format!("m-{}", self.next_message_id)
    }
}

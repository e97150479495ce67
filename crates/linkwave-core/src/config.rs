//! Connection manager configuration.
//!
//! Defaults follow the gateway's reference web client: a 3 s base reconnect
//! delay, five retries, and a heartbeat every 4 s on STOMP or 20 s on plain
//! JSON.

use std::{fmt, str::FromStr, time::Duration};

use crate::error::ManagerError;

/// Base reconnect delay, doubled per failed attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3000);

/// Ceiling on any single reconnect delay, applied on top of
/// [`ReconnectPolicy::max_delay`].
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(3600);

/// Reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Heartbeat interval on the plain JSON transport.
pub const DEFAULT_JSON_HEARTBEAT: Duration = Duration::from_secs(20);

/// Heartbeat interval offered in the STOMP `CONNECT` frame.
pub const DEFAULT_STOMP_HEARTBEAT: Duration = Duration::from_millis(4000);

/// Silence after which a connected transport is considered dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed from opening the socket to a usable session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Prefix of STOMP application destinations.
pub const DEFAULT_SEND_PREFIX: &str = "/app";

/// Room topic destination; `{id}` is replaced by the topic name.
pub const DEFAULT_TOPIC_TEMPLATE: &str = "/topic/room.{id}";

/// Placeholder substituted in [`StompConfig::topic_template`].
pub const TOPIC_PLACEHOLDER: &str = "{id}";

/// Exponential backoff with a bounded number of retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Retries after an unexpected close before the manager gives up.
    pub max_attempts: u32,
    /// Upper bound for a single delay. `None` lets delays double up to
    /// [`MAX_RECONNECT_DELAY`].
    pub max_delay: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: DEFAULT_BASE_DELAY, max_attempts: DEFAULT_MAX_ATTEMPTS, max_delay: None }
    }
}

/// Which framing the gateway speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// One JSON envelope per WebSocket text frame.
    Json,
    /// STOMP 1.2 frames over WebSocket.
    Stomp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Stomp => "stomp",
        })
    }
}

impl FromStr for TransportKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "ws" | "websocket" => Ok(Self::Json),
            "stomp" => Ok(Self::Stomp),
            other => Err(ManagerError::config("transport", format!("unknown transport {other:?}"))),
        }
    }
}

/// STOMP-specific settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompConfig {
    /// Value of the `host` header in `CONNECT`.
    pub host: String,
    /// Prefix for `SEND` destinations: envelope `chat.send` goes to
    /// `{send_prefix}/chat.send`.
    pub send_prefix: String,
    /// Destination template for topics, containing [`TOPIC_PLACEHOLDER`].
    pub topic_template: String,
    /// Wrap STOMP in SockJS framing (`{url}/{server}/{session}/websocket`).
    pub sockjs: bool,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            host: "/".to_string(),
            send_prefix: DEFAULT_SEND_PREFIX.to_string(),
            topic_template: DEFAULT_TOPIC_TEMPLATE.to_string(),
            sockjs: false,
        }
    }
}

/// Transport selection with its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Plain JSON over WebSocket.
    Json,
    /// STOMP over WebSocket.
    Stomp(StompConfig),
}

impl TransportConfig {
    /// Payload-free transport tag.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Json => TransportKind::Json,
            Self::Stomp(_) => TransportKind::Stomp,
        }
    }
}

/// Everything the connection manager needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Gateway endpoint (`ws://`, `wss://`, or for SockJS the `http(s)://`
    /// base).
    pub url: String,
    /// Transport framing.
    pub transport: TransportConfig,
    /// Reconnect behaviour.
    pub reconnect: ReconnectPolicy,
    /// Outbound heartbeat interval while connected.
    pub heartbeat_interval: Duration,
    /// Inbound silence tolerated while connected.
    pub idle_timeout: Duration,
    /// Time allowed for a connect attempt to produce a usable session.
    pub connect_timeout: Duration,
}

impl ManagerConfig {
    /// Plain JSON transport with default timings.
    pub fn json(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: TransportConfig::Json,
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: DEFAULT_JSON_HEARTBEAT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// STOMP transport with default timings and destinations.
    pub fn stomp(url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::Stomp(StompConfig::default()),
            heartbeat_interval: DEFAULT_STOMP_HEARTBEAT,
            ..Self::json(url)
        }
    }

    /// Check the configuration for values the manager cannot work with.
    ///
    /// # Errors
    ///
    /// `ManagerError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.url.trim().is_empty() {
            return Err(ManagerError::config("url", "must not be empty"));
        }
        if self.reconnect.base_delay.is_zero() {
            return Err(ManagerError::config("reconnect.base_delay", "must be non-zero"));
        }
        if self.reconnect.base_delay > MAX_RECONNECT_DELAY {
            return Err(ManagerError::config(
                "reconnect.base_delay",
                format!("must not exceed {MAX_RECONNECT_DELAY:?}"),
            ));
        }
        if let Some(max) = self.reconnect.max_delay
            && max < self.reconnect.base_delay
        {
            return Err(ManagerError::config(
                "reconnect.max_delay",
                format!("{max:?} is below base delay {:?}", self.reconnect.base_delay),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ManagerError::config("heartbeat_interval", "must be non-zero"));
        }
        if self.idle_timeout <= self.heartbeat_interval {
            return Err(ManagerError::config(
                "idle_timeout",
                format!(
                    "{:?} must exceed heartbeat interval {:?}",
                    self.idle_timeout, self.heartbeat_interval
                ),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ManagerError::config("connect_timeout", "must be non-zero"));
        }
        if let TransportConfig::Stomp(stomp) = &self.transport {
            if !stomp.send_prefix.starts_with('/') {
                return Err(ManagerError::config("stomp.send_prefix", "must start with '/'"));
            }
            if !stomp.topic_template.contains(TOPIC_PLACEHOLDER) {
                return Err(ManagerError::config(
                    "stomp.topic_template",
                    format!("must contain {TOPIC_PLACEHOLDER}"),
                ));
            }
        }
        Ok(())
    }
}

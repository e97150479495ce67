//! Linkwave line client.
//!
//! # Usage
//!
//! ```bash
//! # Plain JSON gateway
//! linkwave --url ws://localhost:8080/ws
//!
//! # STOMP over SockJS, session cookie from a prior HTTP login
//! export LINKWAVE_SESSION_COOKIE="SESSION=abc"
//! linkwave --transport sockjs --url http://localhost:8080/ws/chat
//! ```
//!
//! Type `/help` for commands; events are written to the log.

mod error;
mod session;

use std::time::Duration;

use clap::{Parser, ValueEnum};
use linkwave_client::{
    ChatHandle, ClientError, ManagerConfig, SendOutcome, TransportConfig,
    proto::{EventKind, InboundEvent, PresenceStatus},
};
use error::CliError;
use session::{Action, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Gateway framing selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// JSON envelopes over a raw WebSocket
    Json,
    /// STOMP 1.2 over a raw WebSocket
    Stomp,
    /// STOMP 1.2 inside SockJS framing
    Sockjs,
}

/// Linkwave chat client
#[derive(Parser, Debug)]
#[command(name = "linkwave")]
#[command(about = "Line-oriented client for the linkwave realtime gateway")]
#[command(version)]
struct Args {
    /// Gateway endpoint (ws:// or wss://; http(s):// base for SockJS)
    #[arg(short, long, env = "LINKWAVE_WS_URL", default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Gateway framing
    #[arg(short, long, env = "LINKWAVE_TRANSPORT", value_enum, default_value = "json")]
    transport: Transport,

    /// Base reconnect delay in milliseconds, doubled per retry
    #[arg(long, env = "LINKWAVE_RECONNECT_DELAY_MS")]
    reconnect_delay_ms: Option<u64>,

    /// Reconnect attempts before giving up
    #[arg(long, env = "LINKWAVE_MAX_RECONNECT")]
    max_reconnect: Option<u32>,

    /// Heartbeat interval in milliseconds
    #[arg(long, env = "LINKWAVE_HEARTBEAT_MS")]
    heartbeat_ms: Option<u64>,

    /// Session cookie sent with the WebSocket upgrade
    #[arg(long, env = "LINKWAVE_SESSION_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// Start without connecting; use /connect later
    #[arg(long)]
    offline: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn manager_config(&self) -> ManagerConfig {
        let mut config = match self.transport {
            Transport::Json => ManagerConfig::json(&self.url),
            Transport::Stomp | Transport::Sockjs => ManagerConfig::stomp(&self.url),
        };
        if let TransportConfig::Stomp(stomp) = &mut config.transport {
            stomp.sockjs = self.transport == Transport::Sockjs;
        }
        if let Some(ms) = self.reconnect_delay_ms {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.max_reconnect {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(ms) = self.heartbeat_ms {
            config.heartbeat_interval = Duration::from_millis(ms);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = args.manager_config();
    tracing::info!(url = %config.url, transport = ?args.transport, "Linkwave client starting");

    let (chat, task) = linkwave_client::spawn(config, args.cookie.as_deref())?;
    for kind in EventKind::ALL {
        chat.on(kind, log_event).await?;
    }
    if !args.offline {
        chat.connect()?;
    }

    let mut session = Session::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    'repl: loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        for action in session.handle_line(&line) {
            match execute(&chat, action).await {
                Ok(true) => {},
                Ok(false) => break 'repl,
                Err(ClientError::RuntimeGone) => {
                    tracing::error!("Connection runtime stopped");
                    break 'repl;
                },
                Err(e) => tracing::warn!("{e}"),
            }
        }
    }

    tracing::info!("Shutting down");
    // Already stopped if the loop ended on RuntimeGone.
    let _ = chat.shutdown().await;
    task.await?;

    Ok(())
}

/// Carry out one session action. Returns `false` when the user quits.
async fn execute(chat: &ChatHandle, action: Action) -> Result<bool, ClientError> {
    let outcome = match action {
        Action::Connect => {
            chat.connect()?;
            return Ok(true);
        },
        Action::Disconnect => {
            chat.disconnect()?;
            return Ok(true);
        },
        Action::Chat { to, body } => chat.send_chat(&to, &body).await?,
        Action::RoomChat { room_id, body } => chat.send_room_chat(&room_id, &body).await?,
        Action::TypingStart { to } => chat.start_typing(&to).await?,
        Action::TypingStop { to } => chat.stop_typing(&to).await?,
        Action::MarkRead { room_id, message_id } => chat.mark_read(&room_id, &message_id).await?,
        Action::Subscribe { topic } => {
            chat.subscribe(topic.as_str()).await?;
            tracing::info!(%topic, "Subscribed");
            return Ok(true);
        },
        Action::Unsubscribe { topic } => {
            chat.unsubscribe(topic.as_str()).await?;
            tracing::info!(%topic, "Unsubscribed");
            return Ok(true);
        },
        Action::Status => {
            tracing::info!(state = %chat.status(), "Connection status");
            return Ok(true);
        },
        Action::Quit => return Ok(false),
        Action::Notice(text) => {
            tracing::info!("{text}");
            return Ok(true);
        },
    };

    if outcome == SendOutcome::Queued {
        tracing::info!("Not connected; message queued");
    }
    Ok(true)
}

fn log_event(event: &InboundEvent) {
    match event {
        InboundEvent::ChatMessage(msg) => tracing::info!(
            from = %msg.from,
            room = msg.room_id.as_deref().unwrap_or("-"),
            id = %msg.message_id,
            "{}",
            msg.body
        ),
        InboundEvent::PresenceChanged { user_id, status, .. } => {
            let status = match status {
                PresenceStatus::Online => "online",
                PresenceStatus::Offline => "offline",
            };
            tracing::info!(user = %user_id, "Now {status}");
        },
        InboundEvent::TypingStarted { from, .. } => tracing::info!(user = %from, "Typing..."),
        InboundEvent::TypingStopped { from, .. } => tracing::debug!(user = %from, "Stopped typing"),
        InboundEvent::ReadReceipt { reader_id, message_ids, .. } => {
            tracing::info!(reader = %reader_id, count = message_ids.len(), "Read receipt");
        },
        InboundEvent::ConnectionOpened => tracing::info!("Connected"),
        InboundEvent::ConnectionClosed { reason } => tracing::warn!(%reason, "Connection lost"),
    }
}

#[cfg(test)]
mod tests {
    use linkwave_client::TransportKind;

    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("linkwave").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_manager_defaults() {
        let config = parse(&["--url", "ws://gw/ws", "--transport", "json"]).manager_config();
        assert_eq!(config, ManagerConfig::json("ws://gw/ws"));
        config.validate().unwrap();
    }

    #[test]
    fn sockjs_is_stomp_with_framing() {
        let config =
            parse(&["--url", "http://gw/ws/chat", "--transport", "sockjs"]).manager_config();
        assert_eq!(config.transport.kind(), TransportKind::Stomp);
        let TransportConfig::Stomp(stomp) = &config.transport else {
            panic!("expected STOMP transport");
        };
        assert!(stomp.sockjs);
    }

    #[test]
    fn overrides_apply() {
        let config = parse(&[
            "--url",
            "ws://gw/ws",
            "--transport",
            "stomp",
            "--reconnect-delay-ms",
            "250",
            "--max-reconnect",
            "9",
            "--heartbeat-ms",
            "1000",
        ])
        .manager_config();
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_attempts, 9);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1000));
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn invalid_settings_fail_startup() {
        let config = parse(&["--heartbeat-ms", "0"]).manager_config();
        let Err(err) = linkwave_client::spawn(config, None) else {
            panic!("zero heartbeat must be rejected");
        };
        let err = CliError::from(err);
        assert!(matches!(err, CliError::Startup(_)));
        assert!(err.to_string().contains("heartbeat_interval"), "{err}");
    }
}

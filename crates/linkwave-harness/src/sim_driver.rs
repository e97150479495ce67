//! Simulation driver implementing the client's Driver trait.
//!
//! `SimDriver` stands in for the WebSocket driver so the production
//! [`linkwave_client::Runtime`] can run against scripted transport events.
//! The runtime owns the driver; the test keeps the paired [`SimRemote`] to
//! inspect what the runtime asked for and to inject socket events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkwave_client::{Driver, TransportEvent};
use tokio::sync::mpsc;

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// One call the runtime made on the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    /// `open(generation, url)`
    Open {
        /// Socket generation
        generation: u64,
        /// Requested URL
        url: String,
    },
    /// `transmit(generation, text)` on the current socket
    Transmit {
        /// Socket generation
        generation: u64,
        /// Frame text
        text: String,
    },
    /// `close(generation)`
    Close {
        /// Socket generation
        generation: u64,
    },
}

#[derive(Debug, Default)]
struct SharedState {
    calls: Vec<DriverCall>,
    current: Option<u64>,
}

fn lock(state: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted transport driver.
#[derive(Debug)]
pub struct SimDriver {
    state: Arc<Mutex<SharedState>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Test-side control of a [`SimDriver`].
#[derive(Debug, Clone)]
pub struct SimRemote {
    state: Arc<Mutex<SharedState>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl SimDriver {
    /// Create a driver and its remote.
    pub fn new() -> (Self, SimRemote) {
        let state = Arc::new(Mutex::new(SharedState::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { state: Arc::clone(&state), events: rx }, SimRemote { state, events: tx })
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    fn open(&mut self, generation: u64, url: &str) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.calls.push(DriverCall::Open { generation, url: url.to_string() });
        state.current = Some(generation);
        Ok(())
    }

    fn transmit(&mut self, generation: u64, text: String) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.current != Some(generation) {
            return Err(SimDriverError(format!("generation {generation} is not open")));
        }
        state.calls.push(DriverCall::Transmit { generation, text });
        Ok(())
    }

    fn close(&mut self, generation: u64) {
        let mut state = lock(&self.state);
        state.calls.push(DriverCall::Close { generation });
        if state.current == Some(generation) {
            state.current = None;
        }
    }

    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send {
        self.events.recv()
    }
}

impl SimRemote {
    /// Inject a transport event.
    pub fn inject(&self, event: TransportEvent) {
        // The runtime may already be gone; then nobody cares.
        let _ = self.events.send(event);
    }

    /// Report the socket of `generation` open.
    pub fn opened(&self, generation: u64) {
        self.inject(TransportEvent::opened(generation));
    }

    /// Deliver a text frame on `generation`.
    pub fn text(&self, generation: u64, text: impl Into<String>) {
        self.inject(TransportEvent::text(generation, text));
    }

    /// Report the socket of `generation` closed.
    pub fn closed(&self, generation: u64, reason: &str) {
        self.inject(TransportEvent::closed(generation, reason));
    }

    /// Report that `generation` failed to open.
    pub fn failed(&self, generation: u64, reason: &str) {
        self.inject(TransportEvent::failed(generation, reason));
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.state).calls.clone()
    }

    /// Take and clear the recorded calls.
    pub fn take_calls(&self) -> Vec<DriverCall> {
        std::mem::take(&mut lock(&self.state).calls)
    }

    /// Generation of the most recent open.
    pub fn last_open(&self) -> Option<u64> {
        lock(&self.state).calls.iter().rev().find_map(|call| match call {
            DriverCall::Open { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    /// Number of opens so far.
    pub fn open_count(&self) -> usize {
        lock(&self.state).calls.iter().filter(|c| matches!(c, DriverCall::Open { .. })).count()
    }

    /// Texts transmitted so far, in order.
    pub fn transmitted(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Transmit { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_needs_current_generation() {
        let (mut driver, remote) = SimDriver::new();
        assert!(driver.transmit(1, "x".into()).is_err());

        driver.open(1, "ws://gw").unwrap();
        driver.transmit(1, "hello".into()).unwrap();
        driver.close(1);
        assert!(driver.transmit(1, "late".into()).is_err());

        assert_eq!(remote.transmitted(), vec!["hello".to_string()]);
        assert_eq!(remote.last_open(), Some(1));
        assert_eq!(remote.open_count(), 1);
        assert_eq!(remote.take_calls().len(), 3);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn injected_events_arrive_in_order() {
        let (mut driver, remote) = SimDriver::new();
        remote.opened(4);
        remote.text(4, "a");
        remote.closed(4, "bye");

        assert_eq!(driver.next_event().await, Some(TransportEvent::opened(4)));
        assert_eq!(driver.next_event().await, Some(TransportEvent::text(4, "a")));
        assert_eq!(driver.next_event().await, Some(TransportEvent::closed(4, "bye")));
    }
}

//! Inbound event dispatch.
//!
//! Handlers are keyed by [`EventKind`] and run synchronously, in registration
//! order, on the task that owns the dispatcher. A handler must not block: it
//! runs between transport reads.

use std::fmt;

use linkwave_proto::{EventKind, InboundEvent};

/// Callback invoked for matching events.
pub type Handler = Box<dyn FnMut(&InboundEvent) + Send>;

/// Registration token returned by [`Dispatcher::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    kind: EventKind,
    handler: Handler,
}

/// Event-kind to handler registry.
#[derive(Default)]
pub struct Dispatcher {
    registrations: Vec<Registration>,
    next_id: u64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("handlers", &self.registrations.len()).finish()
    }
}

impl Dispatcher {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on(&mut self, kind: EventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.registrations.push(Registration { id, kind, handler });
        id
    }

    /// Remove a handler. Returns `false` if `id` was not registered.
    pub fn off(&mut self, id: HandlerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// Returns the number of handlers invoked. Events nobody listens for are
    /// dropped.
    pub fn dispatch(&mut self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let mut called = 0;
        for registration in self.registrations.iter_mut().filter(|r| r.kind == kind) {
            (registration.handler)(event);
            called += 1;
        }
        if called == 0 {
            tracing::trace!(%kind, "no handler for event");
        }
        called
    }

    /// Handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registrations.iter().filter(|r| r.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Handler {
        let log = Arc::clone(log);
        Box::new(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(EventKind::ConnectionOpened, recorder(&log, "first"));
        dispatcher.on(EventKind::ConnectionClosed, recorder(&log, "other"));
        dispatcher.on(EventKind::ConnectionOpened, recorder(&log, "second"));

        assert_eq!(dispatcher.dispatch(&InboundEvent::ConnectionOpened), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let a = dispatcher.on(EventKind::ConnectionOpened, recorder(&log, "a"));
        dispatcher.on(EventKind::ConnectionOpened, recorder(&log, "b"));

        assert!(dispatcher.off(a));
        assert!(!dispatcher.off(a));
        dispatcher.dispatch(&InboundEvent::ConnectionOpened);
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn unhandled_event_is_dropped() {
        let mut dispatcher = Dispatcher::new();
        let event = InboundEvent::ConnectionClosed { reason: "bye".into() };
        assert_eq!(dispatcher.dispatch(&event), 0);
        assert_eq!(dispatcher.handler_count(EventKind::ConnectionClosed), 0);
    }
}

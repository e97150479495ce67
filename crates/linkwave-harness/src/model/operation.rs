//! Operations for model-based testing.
//!
//! Operations cover both sides of the connection: what the application does
//! through the manager, and what the network and gateway do to it. They are
//! generated by proptest (or decoded from fuzz input via `Arbitrary`) and
//! applied to a [`super::SimWorld`] one at a time.

use arbitrary::Arbitrary;

/// Room identifier (uses u8 to keep the topic space small).
pub type ModelRoomId = u8;

/// Operations that can be applied to the simulated system.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Application calls `connect()`.
    Connect,

    /// Application calls `disconnect()`.
    Disconnect,

    /// Application sends a numbered chat message.
    Send,

    /// Application subscribes to a room topic.
    Subscribe {
        /// Room to subscribe to.
        room: ModelRoomId,
    },

    /// Application unsubscribes from a room topic.
    Unsubscribe {
        /// Room to drop.
        room: ModelRoomId,
    },

    /// The network drops the live socket.
    DropConnection,

    /// The gateway refuses the next few opens.
    RefuseOpens {
        /// Number of opens to refuse.
        count: u8,
    },

    /// The next open never completes.
    StallNextOpen,

    /// The gateway stops answering but keeps the socket up.
    Silence,

    /// The gateway sends a STOMP `ERROR` frame.
    ServerError,

    /// The gateway publishes a message on a room topic.
    Publish {
        /// Target room.
        room: ModelRoomId,
    },

    /// The gateway pushes a typing event.
    PushEvent,

    /// The gateway sends a frame the client cannot decode.
    Garbage,

    /// Advance simulation time.
    ///
    /// Fires every manager deadline that falls inside the window.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

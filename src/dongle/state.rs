//! Connection state machine.
//!
//! All transitions go through [`step`], which returns the next state and the
//! event to publish (if the state actually changed). Keeping it pure makes the
//! whole table testable without a transport.
//!
//! ```text
//!              Connected                BeginWrite
//! Disconnected ─────────► Idle ◄──────────────────► Writing
//!      ▲                   │          EndWrite         │
//!      │    Disconnected   │                           │
//!      └───────────────────┴───────────────────────────┘
//! ```

use serde::Serialize;
use std::fmt;

use super::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    /// Port open and handshaken, ready for the next write.
    Idle,
    /// A write transaction is in flight.
    Writing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Idle => "idle",
            ConnectionState::Writing => "writing",
        };
        f.write_str(s)
    }
}

/// What happened to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Port opened and handshake accepted.
    Connected,
    /// Open or handshake failed.
    ConnectFailed,
    /// Port closed, on request or after a connection problem.
    Disconnected,
    /// A write transaction starts an attempt.
    BeginWrite,
    /// A write transaction resolved, successfully or not.
    EndWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: ConnectionState,
    pub event: Option<Event>,
}

/// Compute the transition for `trigger` applied in `current`.
pub fn step(current: ConnectionState, trigger: Trigger) -> Step {
    use ConnectionState::*;
    let next = match (current, trigger) {
        (Writing, Trigger::Connected) => Writing,
        (_, Trigger::Connected) => Idle,
        (_, Trigger::ConnectFailed) | (_, Trigger::Disconnected) => Disconnected,
        (_, Trigger::BeginWrite) => Writing,
        // a failed command leaves the link Idle; the supervisor reopens a dead handle
        (_, Trigger::EndWrite) => Idle,
    };
    Step {
        next,
        event: (next != current).then_some(Event::ConnectionStateChanged(next)),
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    fn next(current: ConnectionState, trigger: Trigger) -> ConnectionState {
        step(current, trigger).next
    }

    #[test]
    fn transition_table() {
        assert_eq!(next(Disconnected, Trigger::Connected), Idle);
        assert_eq!(next(Disconnected, Trigger::ConnectFailed), Disconnected);
        assert_eq!(next(Idle, Trigger::BeginWrite), Writing);
        assert_eq!(next(Writing, Trigger::EndWrite), Idle);
        assert_eq!(next(Writing, Trigger::Disconnected), Disconnected);
        assert_eq!(next(Disconnected, Trigger::BeginWrite), Writing);
        assert_eq!(next(Disconnected, Trigger::EndWrite), Idle);
        assert_eq!(next(Idle, Trigger::Disconnected), Disconnected);
    }

    #[test]
    fn connect_never_interrupts_a_write() {
        assert_eq!(next(Writing, Trigger::Connected), Writing);
    }

    #[test]
    fn event_only_on_change() {
        assert_eq!(step(Disconnected, Trigger::Disconnected).event, None);
        assert_eq!(step(Idle, Trigger::Connected).event, None);
        assert_eq!(
            step(Idle, Trigger::Disconnected).event,
            Some(Event::ConnectionStateChanged(Disconnected))
        );
    }

    #[test]
    fn writing_never_survives_end_write() {
        for s in [Disconnected, Idle, Writing] {
            assert_ne!(next(s, Trigger::EndWrite), Writing);
        }
    }
}

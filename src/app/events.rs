//! Outbound application events and host-loop outcomes.
//!
//! The [`ThingService`](super::service::ThingService) emits
//! [`ThingEvent`]s through the [`EventSink`](super::ports::EventSink)
//! port and answers every tick with a [`Tick`].  A restart is never
//! performed by the core; it is handed back to the caller as
//! [`Tick::Restart`].

use crate::error::ParseError;
use crate::ota::UpdateOutcome;

/// Result of one host-loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Session is up; nothing is outstanding.
    Ready,
    /// Not connected yet, or an update is streaming.  Call again.
    Pending,
    /// Terminal: the device must restart now.
    Restart(RestartReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The link stayed down past the configured ceiling.
    LinkTimeout,
    /// The reserved `reset` command arrived.
    ResetCommand,
    /// An update reached its terminal state, whatever the outcome.
    UpdateFinished(UpdateOutcome),
}

/// Structured events emitted by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum ThingEvent {
    LinkLost,
    LinkRestored { waited_ms: u64 },
    SessionEstablished,
    SessionLost,
    SessionRefused { code: i32 },
    CommandReceived { name: String },
    CommandDropped(ParseError),
    Heartbeat { sequence: u64 },
    UpdateAnnounced { length: u32 },
    UpdateFinished(UpdateOutcome),
    RestartRequested(RestartReason),
}

//! Session progress events broadcast to interested subscribers.
//!
//! The controller publishes status transitions and collected digits over
//! `tokio::sync::broadcast`; hosts forward them to whatever surface they
//! have (AMI-style manager events, a web socket, logs). Sends to a
//! subscriber-less channel are deliberately ignored.

use serde::{Deserialize, Serialize};

/// Emitted on every session status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of a speak session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Controller created, no session running.
    Idle,
    /// Engine/port/voice setup in progress.
    Preparing,
    /// Audio streaming to the channel.
    Streaming,
    /// Playback over, waiting on further keypad input.
    Collecting,
    /// Synthesis finished and the queue drained.
    Completed,
    /// A keypress ended playback early.
    Interrupted,
    /// The far end hung up.
    HungUp,
    /// Setup failed; the session never ran or was cut short.
    Failed,
}

/// Emitted for every digit accepted into the collected result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitEvent {
    /// Monotonically increasing sequence number within the controller.
    pub seq: u64,
    pub digit: char,
}

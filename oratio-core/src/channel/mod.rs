//! Telephony channel abstraction.
//!
//! The `TelephonyChannel` trait is what the session drives: a sink for
//! fixed-size timed frames plus a blocking wait-with-timeout primitive that
//! multiplexes keypresses, incoming media, and hangup. Real transports
//! (PBX channel drivers, softphone stacks) implement it; tests and demos
//! use [`loopback::LoopbackChannel`].

pub mod loopback;

use std::time::Duration;

use crate::buffering::frame::AudioFrame;
use crate::error::Result;

/// Wire encoding of frames written to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// G.711 u-law, one byte per sample.
    Ulaw,
    /// G.711 A-law, one byte per sample.
    Alaw,
    /// Signed linear 16-bit PCM.
    Slin,
}

/// What a bounded wait on the channel produced.
///
/// A transport error and a torn-down channel both surface as `Hangup`;
/// the session treats them identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The timeout elapsed with nothing to read.
    Timeout,
    /// Incoming media arrived; the session discards it.
    Media,
    /// A keypress arrived, carrying the transport's raw digit code.
    Digit(i64),
    /// The far end hung up (or the channel errored out).
    Hangup,
}

/// Contract for channel transports.
pub trait TelephonyChannel: Send {
    /// Answer the channel if it is not already up.
    fn answer_if_needed(&mut self) -> Result<()>;

    /// Switch the write format, returning the format that was previously
    /// active so the caller can restore it.
    fn set_write_format(&mut self, format: AudioFormat) -> Result<AudioFormat>;

    /// Write one frame toward the far end.
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Block until an event arrives or `timeout` elapses.
    fn wait_for_event(&mut self, timeout: Duration) -> ChannelEvent;

    /// Block until a keypress arrives, returning its raw digit code, or
    /// `None` when the wait timed out (or the channel went away).
    fn wait_for_digit(&mut self, timeout: Duration) -> Option<i64>;

    /// Publish a value into the caller-visible variable namespace.
    fn set_variable(&mut self, name: &str, value: &str);
}

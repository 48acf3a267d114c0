//! `LoopbackChannel` — in-memory channel transport for development and
//! tests.
//!
//! Frames written to it are recorded instead of transmitted, and a
//! [`LoopbackDriver`] handle injects keypresses and hangup from the test
//! thread. The blocking wait maps straight onto
//! `crossbeam_channel::Receiver::recv_timeout`, which is exactly the
//! combined wait-for-input-or-timeout primitive the session needs.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use super::{AudioFormat, ChannelEvent, TelephonyChannel};
use crate::buffering::frame::AudioFrame;
use crate::error::{OratioError, Result};

/// Test-side handle that plays the far end of a [`LoopbackChannel`].
#[derive(Debug, Clone)]
pub struct LoopbackDriver {
    tx: Sender<ChannelEvent>,
}

impl LoopbackDriver {
    /// Inject a keypress with the given raw digit code.
    pub fn press_key(&self, code: i64) {
        let _ = self.tx.send(ChannelEvent::Digit(code));
    }

    /// Inject incoming media (the session discards these).
    pub fn send_media(&self) {
        let _ = self.tx.send(ChannelEvent::Media);
    }

    /// Hang up the call.
    pub fn hang_up(&self) {
        let _ = self.tx.send(ChannelEvent::Hangup);
    }
}

/// In-memory [`TelephonyChannel`] implementation.
pub struct LoopbackChannel {
    events: Receiver<ChannelEvent>,
    frames: Vec<AudioFrame>,
    format: AudioFormat,
    variables: HashMap<String, String>,
    answered: bool,
    hung_up: bool,
}

impl LoopbackChannel {
    /// Create a channel plus the driver handle for its far end.
    pub fn pair() -> (Self, LoopbackDriver) {
        let (tx, rx) = unbounded();
        (
            Self {
                events: rx,
                frames: Vec::new(),
                format: AudioFormat::Slin,
                variables: HashMap::new(),
                answered: false,
                hung_up: false,
            },
            LoopbackDriver { tx },
        )
    }

    /// Frames written so far.
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Total payload bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.frames.iter().map(|f| f.payload.len()).sum()
    }

    /// All written payloads concatenated in emission order.
    pub fn written_audio(&self) -> Vec<u8> {
        self.frames
            .iter()
            .flat_map(|f| f.payload.iter().copied())
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn is_answered(&self) -> bool {
        self.answered
    }

    pub fn write_format(&self) -> AudioFormat {
        self.format
    }

    fn next_event(&mut self, timeout: Duration) -> ChannelEvent {
        if self.hung_up {
            return ChannelEvent::Hangup;
        }
        match self.events.recv_timeout(timeout) {
            Ok(ChannelEvent::Hangup) => {
                self.hung_up = true;
                ChannelEvent::Hangup
            }
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => ChannelEvent::Timeout,
            // Driver dropped: the far end is gone.
            Err(RecvTimeoutError::Disconnected) => {
                self.hung_up = true;
                ChannelEvent::Hangup
            }
        }
    }
}

impl TelephonyChannel for LoopbackChannel {
    fn answer_if_needed(&mut self) -> Result<()> {
        if !self.answered {
            debug!("loopback channel answered");
            self.answered = true;
        }
        Ok(())
    }

    fn set_write_format(&mut self, format: AudioFormat) -> Result<AudioFormat> {
        let prior = self.format;
        self.format = format;
        Ok(prior)
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.hung_up {
            return Err(OratioError::Channel("write on hung-up channel".into()));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn wait_for_event(&mut self, timeout: Duration) -> ChannelEvent {
        self.next_event(timeout)
    }

    fn wait_for_digit(&mut self, timeout: Duration) -> Option<i64> {
        // Skip non-digit traffic until a key or the deadline arrives.
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.next_event(remaining) {
                ChannelEvent::Digit(code) => return Some(code),
                ChannelEvent::Timeout | ChannelEvent::Hangup => return None,
                ChannelEvent::Media => continue,
            }
        }
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }
}

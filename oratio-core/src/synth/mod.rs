//! Speech synthesis abstraction.
//!
//! The engine is an opaque, push-only producer: once `speak_text` starts a
//! stream, the engine's own thread delivers audio through the registered
//! [`SynthesisObserver`] until it signals end-of-stream. The one control
//! the session has over a running stream is [`SynthesisPort::stop`].
//!
//! Engine and port teardown happen through `Drop`, in reverse acquisition
//! order. Adapters over real engines should log and skip a chunk whose
//! audio fetch fails rather than treating it as end-of-stream.

pub mod producer;
pub mod scripted;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::AudioFormat;
use crate::error::Result;

/// How the voice for a session is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoiceSelection {
    /// Whatever the engine considers its default voice.
    #[default]
    EngineDefault,
    /// A voice looked up by name.
    Named(String),
}

impl std::fmt::Display for VoiceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceSelection::EngineDefault => f.write_str("<engine default>"),
            VoiceSelection::Named(name) => f.write_str(name),
        }
    }
}

/// Parameters for opening a synthesis port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortParams {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output encoding delivered through the observer.
    pub encoding: AudioFormat,
}

impl PortParams {
    /// Raw u-law at the given rate — what a telephony session wants.
    pub fn telephony(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            encoding: AudioFormat::Ulaw,
        }
    }
}

/// Opaque handle to one synthesis stream started by `speak_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(pub u64);

/// How urgently a stream should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Abort immediately, discarding pending synthesis.
    Now,
    /// Finish the current utterance first.
    AfterCurrent,
}

/// Receives the engine's push-style callbacks. Implementations must be
/// callable from the engine's internal thread.
pub trait SynthesisObserver: Send + Sync + 'static {
    /// One burst of encoded audio. Chunk sizes are whatever the engine
    /// felt like producing.
    fn on_audio(&self, chunk: &[u8]);

    /// End of stream; no further audio will be delivered.
    fn on_end(&self);
}

/// Contract for synthesis engine backends.
pub trait SynthesisEngine: Send {
    /// Open a port configured for the given output parameters.
    fn open_port(&mut self, params: &PortParams) -> Result<Box<dyn SynthesisPort>>;
}

/// One open synthesis port: voice selection, observer registration, and
/// stream control.
pub trait SynthesisPort: Send {
    fn select_voice(&mut self, voice: &VoiceSelection) -> Result<()>;

    /// Register the observer that receives audio and end-of-stream
    /// callbacks. Must be called before `speak_text`.
    fn set_observer(&mut self, observer: Arc<dyn SynthesisObserver>);

    /// Start synthesizing `text`, returning a handle to the new stream.
    fn speak_text(&mut self, text: &str) -> Result<StreamHandle>;

    /// Ask the engine to stop a stream. Engines treat this as idempotent;
    /// repeated stops of the same stream are tolerated.
    fn stop(&mut self, stream: StreamHandle, mode: StopMode) -> Result<()>;
}

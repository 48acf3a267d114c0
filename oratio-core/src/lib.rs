//! # oratio-core
//!
//! Real-time text-to-speech playback core for telephony channels.
//!
//! ## Architecture
//!
//! ```text
//! SynthesisPort ──(engine thread: on_audio / on_end)──► AudioProducer
//!                                                           │ bounded writes
//!                                                     SharedSession
//!                                                     (Mutex + Condvar, ByteRing)
//!                                                           │ paced drain
//! TelephonyChannel ◄──(fixed-size AudioFrame every N ms)── consumer loop
//!         │ digit / hangup ──► cancel flag ──► SynthesisPort::stop
//! ```
//!
//! The synthesis engine pushes audio in bursts of arbitrary size; the
//! channel needs small frames on a strict real-time schedule. The ring
//! buffer between them absorbs the mismatch, the producer blocks when it
//! runs too far ahead, and a keypress or hangup cancels synthesis
//! cooperatively within one wait cycle.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod channel;
pub mod dtmf;
pub mod error;
pub mod events;
pub mod session;
pub mod synth;

// Convenience re-exports for downstream crates
pub use error::OratioError;
pub use events::{DigitEvent, SessionStatus, SessionStatusEvent};
pub use session::{
    DigitPolicy, Disposition, SessionConfig, SessionController, SessionOutcome,
};
pub use synth::VoiceSelection;

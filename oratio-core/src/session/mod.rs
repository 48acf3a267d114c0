//! `SessionController` — one speak invocation, end to end.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionController::new(config)
//!     └─► speak(engine, channel, text)
//!           ├─ open port, select voice, wire observer, start synthesis
//!           ├─ answer channel, switch write format to u-law
//!           ├─ paced consumer loop (frames out, digits/hangup in)
//!           ├─ keypad collection per DigitPolicy
//!           └─ publish digits, restore format, drop engine resources
//! ```
//!
//! Every invocation gets a fresh [`SharedSession`]; nothing persists
//! between calls. Setup failures return `Err` and the caller should end
//! the call; a hangup is a normal outcome, reported through
//! [`Disposition::HungUp`].

pub mod consumer;
pub mod state;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::channel::{AudioFormat, TelephonyChannel};
use crate::dtmf;
use crate::error::{OratioError, Result};
use crate::events::{DigitEvent, SessionStatus, SessionStatusEvent};
use crate::synth::{
    producer::AudioProducer, PortParams, StopMode, SynthesisEngine, VoiceSelection,
};

pub use consumer::{DiagnosticsSnapshot, SessionDiagnostics};

use self::state::SharedSession;

/// Channel variable that receives the collected digits.
pub const DIGIT_VARIABLE: &str = "ORATIO_DTMF";

/// Voice used when the config does not name one.
pub const DEFAULT_VOICE: &str = "David-8kHz";

/// Broadcast capacity: events buffered for slow subscribers.
const BROADCAST_CAP: usize = 64;

/// What to do with keypresses during and after playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DigitPolicy {
    /// Keypresses are discarded; playback always runs to completion.
    #[default]
    Ignore,
    /// A keypress ends playback and counts as the first collected digit;
    /// collection continues until `max_digits` digits arrived or one
    /// inter-digit wait of `timeout_ms` elapses.
    Collect { max_digits: u32, timeout_ms: u64 },
}

impl DigitPolicy {
    pub fn is_enabled(self) -> bool {
        matches!(self, DigitPolicy::Collect { .. })
    }
}

/// Configuration for one controller, constructed once at startup and
/// passed in — no process-wide mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Ring capacity in bytes. Default: 65535.
    pub buffer_capacity: usize,
    /// Frame size in bytes; 640 bytes is 80 ms at 8 kHz u-law.
    pub frame_bytes: usize,
    /// Playback sample rate in Hz. Default: 8000.
    pub sample_rate: u32,
    /// Head start given to synthesis before the first frame is due.
    /// Default: 100 ms.
    pub prime_delay_ms: u64,
    /// Voice selection handed to the engine.
    pub voice: VoiceSelection,
    /// Keypad handling policy.
    pub digit_policy: DigitPolicy,
    /// When exactly one digit is collected, surface it on the outcome as
    /// a dialplan routing hint.
    pub route_on_single_digit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 65535,
            frame_bytes: 640,
            sample_rate: 8000,
            prime_delay_ms: 100,
            voice: VoiceSelection::Named(DEFAULT_VOICE.into()),
            digit_policy: DigitPolicy::Ignore,
            route_on_single_digit: false,
        }
    }
}

impl SessionConfig {
    /// Reject configs a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(OratioError::InvalidConfig("buffer capacity is zero".into()));
        }
        if self.frame_bytes == 0 {
            return Err(OratioError::InvalidConfig("frame size is zero".into()));
        }
        if self.frame_bytes > self.buffer_capacity {
            return Err(OratioError::InvalidConfig(format!(
                "frame size {} exceeds buffer capacity {}",
                self.frame_bytes, self.buffer_capacity
            )));
        }
        if self.sample_rate == 0 {
            return Err(OratioError::InvalidConfig("sample rate is zero".into()));
        }
        if let DigitPolicy::Collect {
            max_digits,
            timeout_ms,
        } = self.digit_policy
        {
            if max_digits == 0 || timeout_ms == 0 {
                return Err(OratioError::InvalidConfig(
                    "digit collection needs max digits and a timeout".into(),
                ));
            }
        }
        Ok(())
    }

    /// Read a JSON config file, falling back to defaults (with a warning)
    /// when the file is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<SessionConfig>(&raw) {
                Ok(config) => {
                    info!(path = %path.display(), "session config loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config parse failed, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config not readable, using defaults");
                Self::default()
            }
        }
    }

    fn prime_delay(&self) -> Duration {
        Duration::from_millis(self.prime_delay_ms)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Synthesis finished and the queue drained.
    Completed,
    /// A keypress ended playback early.
    Interrupted,
    /// The far end hung up.
    HungUp,
}

impl Disposition {
    /// The caller should tear the call down.
    pub fn should_end_call(self) -> bool {
        matches!(self, Disposition::HungUp)
    }

    fn status(self) -> SessionStatus {
        match self {
            Disposition::Completed => SessionStatus::Completed,
            Disposition::Interrupted => SessionStatus::Interrupted,
            Disposition::HungUp => SessionStatus::HungUp,
        }
    }
}

/// Result of a completed speak invocation.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub disposition: Disposition,
    /// Digits accepted into the collected result, in arrival order.
    pub digits: String,
    /// Single collected digit when routing is enabled, for dialplan
    /// navigation by the caller.
    pub route_digit: Option<char>,
    /// Playback counters for the session.
    pub stats: DiagnosticsSnapshot,
}

/// Drives speak sessions against a synthesis engine and a telephony
/// channel. `Send + Sync`; one controller can serve many sequential calls.
pub struct SessionController {
    config: SessionConfig,
    status: Mutex<SessionStatus>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    digit_tx: broadcast::Sender<DigitEvent>,
    seq: AtomicU64,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (digit_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config,
            status: Mutex::new(SessionStatus::Idle),
            status_tx,
            digit_tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Subscribe to status transition events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to collected-digit events.
    pub fn subscribe_digits(&self) -> broadcast::Receiver<DigitEvent> {
        self.digit_tx.subscribe()
    }

    /// Speak `text` on `channel`, blocking until the session ends.
    ///
    /// # Errors
    /// Setup failures (empty text, invalid config, engine port/voice/speak,
    /// channel answer or format) — fatal, already cleaned up, no retry.
    /// A hangup is not an error; check [`SessionOutcome::disposition`].
    pub fn speak(
        &self,
        engine: &mut dyn SynthesisEngine,
        channel: &mut dyn TelephonyChannel,
        text: &str,
    ) -> Result<SessionOutcome> {
        let result = self.run_session(engine, channel, text);
        match &result {
            Ok(outcome) => self.set_status(outcome.disposition.status(), None),
            Err(e) => self.set_status(SessionStatus::Failed, Some(e.to_string())),
        }
        result
    }

    fn run_session(
        &self,
        engine: &mut dyn SynthesisEngine,
        channel: &mut dyn TelephonyChannel,
        text: &str,
    ) -> Result<SessionOutcome> {
        if text.trim().is_empty() {
            warn!("speak invoked without text");
            return Err(OratioError::EmptyText);
        }
        self.config.validate()?;

        info!(text, "speaking text");
        if let DigitPolicy::Collect {
            max_digits,
            timeout_ms,
        } = self.config.digit_policy
        {
            info!(max_digits, timeout_ms, "keypad collection enabled");
        }

        self.set_status(SessionStatus::Preparing, None);
        let shared = Arc::new(SharedSession::new(
            self.config.buffer_capacity,
            self.config.frame_bytes,
            self.config.sample_rate,
        ));
        let diagnostics = Arc::new(SessionDiagnostics::default());

        // Engine resources release in reverse acquisition order when the
        // port drops, whether we exit cleanly or through `?`.
        let mut port = engine.open_port(&PortParams::telephony(self.config.sample_rate))?;
        port.select_voice(&self.config.voice)?;
        port.set_observer(Arc::new(AudioProducer::new(
            Arc::clone(&shared),
            Arc::clone(&diagnostics),
        )));
        let stream = port.speak_text(text)?;

        // The engine thread may already be filling the ring; from here a
        // setup failure must cancel so the port can quiesce on drop.
        let prior_format = match Self::prepare_channel(channel) {
            Ok(format) => format,
            Err(e) => {
                shared.request_cancel();
                if let Err(stop_err) = port.stop(stream, StopMode::Now) {
                    warn!(error = %stop_err, "synthesis stop after setup failure failed");
                }
                return Err(e);
            }
        };

        self.set_status(SessionStatus::Streaming, None);
        let exit = consumer::run(consumer::ConsumerContext {
            shared: &shared,
            channel: &mut *channel,
            port: port.as_mut(),
            stream,
            frame_bytes: self.config.frame_bytes,
            sample_rate: self.config.sample_rate,
            prime_delay: self.config.prime_delay(),
            collect_digits: self.config.digit_policy.is_enabled(),
            diagnostics: diagnostics.as_ref(),
        });

        let digits = self.collect_digits(channel, &exit);
        if !digits.is_empty() {
            channel.set_variable(DIGIT_VARIABLE, &digits);
            info!(%digits, "keypad input collected");
        } else if self.config.digit_policy.is_enabled() && !exit.hangup {
            info!("no keypad input");
        }

        let disposition = if exit.hangup {
            Disposition::HungUp
        } else if shared.is_cancelled() {
            Disposition::Interrupted
        } else {
            Disposition::Completed
        };

        if !exit.hangup {
            if let Err(e) = channel.set_write_format(prior_format) {
                warn!(error = %e, "failed to restore write format");
            }
        }

        let snap = diagnostics.snapshot();
        info!(
            ?disposition,
            frames_out = snap.frames_out,
            bytes_out = snap.bytes_out,
            underruns = snap.underruns,
            chunks_dropped = snap.chunks_dropped,
            engine_stops = snap.engine_stops,
            "session finished"
        );

        let route_digit = if self.config.route_on_single_digit && digits.chars().count() == 1 {
            digits.chars().next()
        } else {
            None
        };

        Ok(SessionOutcome {
            disposition,
            digits,
            route_digit,
            stats: snap,
        })
    }

    fn prepare_channel(channel: &mut dyn TelephonyChannel) -> Result<AudioFormat> {
        channel.answer_if_needed()?;
        channel.set_write_format(AudioFormat::Ulaw)
    }

    fn collect_digits(
        &self,
        channel: &mut dyn TelephonyChannel,
        exit: &consumer::LoopOutcome,
    ) -> String {
        let DigitPolicy::Collect {
            max_digits,
            timeout_ms,
        } = self.config.digit_policy
        else {
            return String::new();
        };

        let mut digits = String::new();
        if let Some(code) = exit.barge_code {
            match dtmf::decode(code) {
                Some(digit) => self.accept_digit(&mut digits, digit),
                None => warn!(code, "unrecognized keypress code, ignoring"),
            }
        }
        if exit.hangup {
            return digits;
        }

        let max = max_digits as usize;
        if digits.chars().count() < max {
            self.set_status(SessionStatus::Collecting, None);
        }
        let timeout = Duration::from_millis(timeout_ms);
        while digits.chars().count() < max {
            match channel.wait_for_digit(timeout) {
                Some(code) => match dtmf::decode(code) {
                    Some(digit) => self.accept_digit(&mut digits, digit),
                    None => warn!(code, "unrecognized keypress code, ignoring"),
                },
                None => break,
            }
        }
        digits
    }

    fn accept_digit(&self, digits: &mut String, digit: char) {
        digits.push(digit);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.digit_tx.send(DigitEvent { seq, digit });
    }

    fn set_status(&self, status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.status_tx.send(SessionStatusEvent { status, detail });
    }
}

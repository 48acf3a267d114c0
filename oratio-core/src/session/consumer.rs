//! Paced playback loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Time remaining until the next frame deadline?
//! 2. Deadline passed:
//!    a. Queue has bytes → emit one frame, advance the deadline by the
//!       frame's sample duration
//!    b. Queue empty (underrun) → advance the deadline by half a frame
//!       and try again
//! 3. Deadline ahead → block on the channel for exactly the remaining
//!    time; hangup and keypresses land here within one wait cycle
//! 4. Cancelled while the engine is still generating → ask it to stop now
//! ```
//!
//! The loop runs on the thread that drives the channel and exits when the
//! session is terminal: cancelled, or synthesis complete with the queue
//! drained. The initial deadline sits one prime-delay in the future so
//! synthesis gets a head start before the first frame is due.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::buffering::frame::{samples_to_duration, AudioFrame};
use crate::channel::{ChannelEvent, TelephonyChannel};
use crate::session::state::SharedSession;
use crate::synth::{StopMode, StreamHandle, SynthesisPort};

/// Shared playback counters for observability.
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub chunks_in: AtomicUsize,
    pub bytes_in: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub frames_out: AtomicUsize,
    pub bytes_out: AtomicUsize,
    pub underruns: AtomicUsize,
    pub engine_stops: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn reset(&self) {
        self.chunks_in.store(0, Ordering::Relaxed);
        self.bytes_in.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.frames_out.store(0, Ordering::Relaxed);
        self.bytes_out.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.engine_stops.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            engine_stops: self.engine_stops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionDiagnostics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub bytes_in: usize,
    pub chunks_dropped: usize,
    pub frames_out: usize,
    pub bytes_out: usize,
    pub underruns: usize,
    pub engine_stops: usize,
}

/// Everything the loop needs, passed as one struct so the call site stays
/// tidy.
pub(crate) struct ConsumerContext<'a> {
    pub shared: &'a Arc<SharedSession>,
    pub channel: &'a mut dyn TelephonyChannel,
    pub port: &'a mut dyn SynthesisPort,
    pub stream: StreamHandle,
    pub frame_bytes: usize,
    pub sample_rate: u32,
    pub prime_delay: std::time::Duration,
    pub collect_digits: bool,
    pub diagnostics: &'a SessionDiagnostics,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopOutcome {
    /// The far end hung up (or the channel errored).
    pub hangup: bool,
    /// Raw code of a keypress that interrupted playback, if any.
    pub barge_code: Option<i64>,
}

/// Run the paced loop until the session is terminal.
pub(crate) fn run(ctx: ConsumerContext<'_>) -> LoopOutcome {
    let frame_duration = samples_to_duration(ctx.frame_bytes, ctx.sample_rate);
    let starved_backoff = frame_duration / 2;
    let mut frame_buf = vec![0u8; ctx.frame_bytes];
    let mut next_deadline = Instant::now() + ctx.prime_delay;
    let mut outcome = LoopOutcome {
        hangup: false,
        barge_code: None,
    };

    while ctx.shared.is_active() {
        let now = Instant::now();
        if next_deadline <= now {
            let n = ctx.shared.read_frame(&mut frame_buf);
            if n > 0 {
                let frame = AudioFrame::ulaw(frame_buf[..n].to_vec());
                if let Err(e) = ctx.channel.write_frame(&frame) {
                    // The wait path will see the hangup; keep pacing.
                    debug!(error = %e, "frame write failed");
                }
                ctx.diagnostics.frames_out.fetch_add(1, Ordering::Relaxed);
                ctx.diagnostics.bytes_out.fetch_add(n, Ordering::Relaxed);
                next_deadline += frame.duration(ctx.sample_rate);
            } else {
                debug!("playback starved for audio");
                ctx.diagnostics.underruns.fetch_add(1, Ordering::Relaxed);
                next_deadline += starved_backoff;
            }
        } else {
            match ctx.channel.wait_for_event(next_deadline - now) {
                ChannelEvent::Hangup => {
                    debug!("hangup detected");
                    outcome.hangup = true;
                    ctx.shared.request_cancel();
                }
                ChannelEvent::Digit(code) => {
                    if ctx.collect_digits {
                        debug!(code, "keypress during playback");
                        outcome.barge_code = Some(code);
                        ctx.shared.request_cancel();
                    }
                    // Keypresses are discarded when collection is off.
                }
                ChannelEvent::Timeout | ChannelEvent::Media => {}
            }
        }

        if ctx.shared.needs_engine_stop() {
            match ctx.port.stop(ctx.stream, StopMode::Now) {
                Ok(()) => debug!("early stop of synthesis requested"),
                Err(e) => warn!(error = %e, "early stop of synthesis failed"),
            }
            ctx.diagnostics.engine_stops.fetch_add(1, Ordering::Relaxed);
        }
    }

    outcome
}

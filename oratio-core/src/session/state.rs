//! Shared per-session state between the synthesis thread and the consumer
//! loop.
//!
//! One mutex guards the ring and both flags; it is held only for the
//! duration of a field access, never across a sleep or a channel wait.
//! The producer's backpressure wait releases the lock on a condvar that
//! the consumer signals after every read, so the wait ends as soon as
//! space frees up — and is bounded by a drain-rate estimate in case it
//! never does.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::buffering::{frame::samples_to_duration, ByteRing};

struct SessionState {
    ring: ByteRing,
    synthesis_complete: bool,
    cancel_requested: bool,
}

/// State shared by the producer callback and the consumer loop for the
/// duration of one speak invocation.
pub struct SharedSession {
    state: Mutex<SessionState>,
    space_freed: Condvar,
    capacity: usize,
    frame_bytes: usize,
    sample_rate: u32,
}

impl SharedSession {
    pub fn new(capacity: usize, frame_bytes: usize, sample_rate: u32) -> Self {
        Self {
            state: Mutex::new(SessionState {
                ring: ByteRing::with_capacity(capacity),
                synthesis_complete: false,
                cancel_requested: false,
            }),
            space_freed: Condvar::new(),
            capacity,
            frame_bytes,
            sample_rate,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently queued.
    pub fn queued_bytes(&self) -> usize {
        self.state.lock().ring.len()
    }

    /// True until the session is terminal: cancelled, or synthesis done
    /// with the queue drained.
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        !state.cancel_requested && (!state.synthesis_complete || !state.ring.is_empty())
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancel_requested
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().synthesis_complete
    }

    /// True while a cancelled session still has a live synthesis stream to
    /// shut down.
    pub fn needs_engine_stop(&self) -> bool {
        let state = self.state.lock();
        state.cancel_requested && !state.synthesis_complete
    }

    /// Request cooperative cancellation and unblock a waiting producer.
    pub fn request_cancel(&self) {
        let mut state = self.state.lock();
        if !state.cancel_requested {
            state.cancel_requested = true;
            debug!("session cancel requested");
        }
        drop(state);
        self.space_freed.notify_all();
    }

    /// Producer end-of-stream. Transitions false→true once; repeats are
    /// no-ops.
    pub fn mark_complete(&self) {
        let mut state = self.state.lock();
        if !state.synthesis_complete {
            state.synthesis_complete = true;
            debug!(queued = state.ring.len(), "synthesis complete");
        }
    }

    /// Write one producer chunk, blocking while the ring is too full.
    ///
    /// A chunk that fits within capacity is written whole once enough
    /// space has drained; a chunk larger than the entire ring is staged
    /// through it in free-space spans. Returns `false` if cancellation was
    /// observed before the chunk was fully written (remaining bytes are
    /// discarded).
    pub fn push_audio(&self, chunk: &[u8]) -> bool {
        let mut remaining = chunk;
        let mut state = self.state.lock();
        loop {
            if state.cancel_requested {
                return false;
            }
            if remaining.is_empty() {
                return true;
            }

            let free = state.ring.free();
            if remaining.len() <= free {
                let written = state.ring.write(remaining);
                debug_assert_eq!(written, remaining.len());
                return true;
            }
            if remaining.len() > self.capacity && free > 0 {
                let written = state.ring.write(remaining);
                remaining = &remaining[written..];
                continue;
            }

            // Queue space frees at the playback byte rate; estimate when
            // the shortfall (plus one frame of margin) will have drained.
            let wait = self.drain_wait_estimate(remaining.len(), free);
            debug!(
                pending = remaining.len(),
                free,
                wait_us = wait.as_micros() as u64,
                "producer waiting for queue space"
            );
            self.space_freed.wait_for(&mut state, wait);
        }
    }

    /// Read up to one frame into `out`, waking a blocked producer if any
    /// space was freed. Returns the byte count, 0 when the queue is empty.
    pub fn read_frame(&self, out: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let n = state.ring.read_into(out);
        drop(state);
        if n > 0 {
            self.space_freed.notify_all();
        }
        n
    }

    fn drain_wait_estimate(&self, needed: usize, free: usize) -> Duration {
        let shortfall = needed.min(self.capacity) - free;
        samples_to_duration(shortfall + self.frame_bytes, self.sample_rate)
    }
}

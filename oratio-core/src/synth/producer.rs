//! Bridges the engine's push-style audio callbacks into the shared ring.
//!
//! Runs on the engine's internal thread. The only blocking it ever does is
//! the bounded backpressure wait inside [`SharedSession::push_audio`];
//! everything else is a short lock-and-copy.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

use super::SynthesisObserver;
use crate::session::consumer::SessionDiagnostics;
use crate::session::state::SharedSession;

/// Flow-controlled writer from synthesis callbacks into the session ring.
pub struct AudioProducer {
    shared: Arc<SharedSession>,
    diagnostics: Arc<SessionDiagnostics>,
}

impl AudioProducer {
    pub fn new(shared: Arc<SharedSession>, diagnostics: Arc<SessionDiagnostics>) -> Self {
        Self {
            shared,
            diagnostics,
        }
    }
}

impl SynthesisObserver for AudioProducer {
    fn on_audio(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            // Engine hiccup, not end-of-stream.
            debug!("empty audio chunk from synthesis, dropping");
            self.diagnostics
                .chunks_dropped
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.shared.push_audio(chunk) {
            self.diagnostics.chunks_in.fetch_add(1, Ordering::Relaxed);
            self.diagnostics
                .bytes_in
                .fetch_add(chunk.len(), Ordering::Relaxed);
        } else {
            debug!(len = chunk.len(), "audio chunk discarded after cancellation");
            self.diagnostics
                .chunks_dropped
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_end(&self) {
        debug!("end-of-stream from synthesis");
        self.shared.mark_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(capacity: usize) -> (AudioProducer, Arc<SharedSession>, Arc<SessionDiagnostics>) {
        let shared = Arc::new(SharedSession::new(capacity, 160, 8000));
        let diagnostics = Arc::new(SessionDiagnostics::default());
        (
            AudioProducer::new(Arc::clone(&shared), Arc::clone(&diagnostics)),
            shared,
            diagnostics,
        )
    }

    #[test]
    fn audio_chunks_land_in_the_ring() {
        let (observer, shared, diagnostics) = producer(1024);
        observer.on_audio(&[1u8; 100]);
        observer.on_audio(&[2u8; 50]);

        assert_eq!(shared.queued_bytes(), 150);
        let snap = diagnostics.snapshot();
        assert_eq!(snap.chunks_in, 2);
        assert_eq!(snap.bytes_in, 150);
    }

    #[test]
    fn empty_chunk_is_dropped_not_end_of_stream() {
        let (observer, shared, diagnostics) = producer(1024);
        observer.on_audio(&[]);

        assert_eq!(shared.queued_bytes(), 0);
        assert!(!shared.is_complete());
        assert_eq!(diagnostics.snapshot().chunks_dropped, 1);
    }

    #[test]
    fn chunks_after_cancellation_are_discarded() {
        let (observer, shared, diagnostics) = producer(1024);
        shared.request_cancel();
        observer.on_audio(&[3u8; 40]);

        assert_eq!(shared.queued_bytes(), 0);
        assert_eq!(diagnostics.snapshot().chunks_dropped, 1);
    }

    #[test]
    fn end_callback_marks_completion_once() {
        let (observer, shared, _diagnostics) = producer(1024);
        observer.on_end();
        observer.on_end();
        assert!(shared.is_complete());
    }
}

//! `ScriptedEngine` — synthesis backend that plays a canned chunk script
//! from a real worker thread.
//!
//! Used in tests and demos before wiring a real engine: it exercises the
//! same threading shape (audio delivered from the engine's own thread,
//! end-of-stream after the last chunk, stop flag checked between chunks)
//! without any vendor SDK.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::{
    PortParams, StopMode, StreamHandle, SynthesisEngine, SynthesisObserver, SynthesisPort,
    VoiceSelection,
};
use crate::error::{OratioError, Result};

/// Deterministic test payload: a rolling byte pattern that makes order
/// and boundary mistakes visible.
pub fn patterned_chunk(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_add(seed)).collect()
}

/// Scripted [`SynthesisEngine`] implementation.
pub struct ScriptedEngine {
    script: Vec<Vec<u8>>,
    chunk_gap: Duration,
    fail_port_open: bool,
    fail_voice: bool,
    fail_speak: bool,
    stops: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    /// Engine whose next stream will deliver `script` chunk by chunk.
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self {
            script,
            chunk_gap: Duration::ZERO,
            fail_port_open: false,
            fail_voice: false,
            fail_speak: false,
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pause between chunks, simulating an engine that produces in bursts.
    pub fn with_chunk_gap(mut self, gap: Duration) -> Self {
        self.chunk_gap = gap;
        self
    }

    pub fn failing_port_open(mut self) -> Self {
        self.fail_port_open = true;
        self
    }

    pub fn failing_voice_selection(mut self) -> Self {
        self.fail_voice = true;
        self
    }

    pub fn failing_speak(mut self) -> Self {
        self.fail_speak = true;
        self
    }

    /// How many stop requests ports from this engine have received.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn open_port(&mut self, params: &PortParams) -> Result<Box<dyn SynthesisPort>> {
        if self.fail_port_open {
            return Err(OratioError::PortOpen("scripted failure".into()));
        }
        debug!(
            sample_rate = params.sample_rate,
            "opening scripted synthesis port"
        );
        Ok(Box::new(ScriptedPort {
            script: self.script.clone(),
            chunk_gap: self.chunk_gap,
            fail_voice: self.fail_voice,
            fail_speak: self.fail_speak,
            observer: None,
            halt: Arc::new(AtomicBool::new(false)),
            stops: Arc::clone(&self.stops),
            worker: None,
            next_stream: 1,
        }))
    }
}

struct ScriptedPort {
    script: Vec<Vec<u8>>,
    chunk_gap: Duration,
    fail_voice: bool,
    fail_speak: bool,
    observer: Option<Arc<dyn SynthesisObserver>>,
    halt: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
    next_stream: u64,
}

impl SynthesisPort for ScriptedPort {
    fn select_voice(&mut self, voice: &VoiceSelection) -> Result<()> {
        if self.fail_voice {
            return Err(OratioError::VoiceUnavailable {
                query: voice.to_string(),
            });
        }
        debug!(%voice, "scripted voice selected");
        Ok(())
    }

    fn set_observer(&mut self, observer: Arc<dyn SynthesisObserver>) {
        self.observer = Some(observer);
    }

    fn speak_text(&mut self, text: &str) -> Result<StreamHandle> {
        if self.fail_speak {
            return Err(OratioError::SpeakStart("scripted failure".into()));
        }
        let observer = self
            .observer
            .clone()
            .ok_or_else(|| OratioError::SpeakStart("no observer registered".into()))?;

        debug!(chars = text.chars().count(), "scripted stream starting");
        let script = self.script.clone();
        let chunk_gap = self.chunk_gap;
        let halt = Arc::clone(&self.halt);
        self.worker = Some(thread::spawn(move || {
            for chunk in script {
                if halt.load(Ordering::Relaxed) {
                    break;
                }
                observer.on_audio(&chunk);
                if !chunk_gap.is_zero() {
                    thread::sleep(chunk_gap);
                }
            }
            // A stopped stream still signals end-of-stream, like a real
            // engine does once the abort finishes.
            observer.on_end();
        }));

        let handle = StreamHandle(self.next_stream);
        self.next_stream += 1;
        Ok(handle)
    }

    fn stop(&mut self, stream: StreamHandle, mode: StopMode) -> Result<()> {
        debug!(stream = stream.0, ?mode, "scripted stream stop requested");
        self.stops.fetch_add(1, Ordering::Relaxed);
        self.halt.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for ScriptedPort {
    fn drop(&mut self) {
        // Quiesce the worker before the port goes away; callers have
        // already cancelled the session, so a blocked write unwinds fast.
        self.halt.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    struct Recorder {
        audio: Mutex<Vec<u8>>,
        ends: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                audio: Mutex::new(Vec::new()),
                ends: AtomicUsize::new(0),
            })
        }
    }

    impl SynthesisObserver for Recorder {
        fn on_audio(&self, chunk: &[u8]) {
            self.audio.lock().extend_from_slice(chunk);
        }

        fn on_end(&self) {
            self.ends.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn wait_for_end(recorder: &Recorder) {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while recorder.ends.load(Ordering::Relaxed) == 0 {
            assert!(std::time::Instant::now() < deadline, "stream never ended");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn delivers_script_then_end() {
        let mut engine =
            ScriptedEngine::new(vec![patterned_chunk(100, 0), patterned_chunk(60, 100)]);
        let mut port = engine.open_port(&PortParams::telephony(8000)).unwrap();
        let recorder = Recorder::new();
        port.set_observer(recorder.clone());
        port.select_voice(&VoiceSelection::EngineDefault).unwrap();
        port.speak_text("hello").unwrap();

        wait_for_end(&recorder);
        let mut expected = patterned_chunk(100, 0);
        expected.extend(patterned_chunk(60, 100));
        assert_eq!(*recorder.audio.lock(), expected);
        assert_eq!(recorder.ends.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stop_halts_delivery_but_still_signals_end() {
        let mut engine = ScriptedEngine::new(vec![patterned_chunk(10, 0); 50])
            .with_chunk_gap(Duration::from_millis(5));
        let stop_counter = engine.stop_count();
        assert_eq!(stop_counter, 0);

        let mut port = engine.open_port(&PortParams::telephony(8000)).unwrap();
        let recorder = Recorder::new();
        port.set_observer(recorder.clone());
        let stream = port.speak_text("interrupted").unwrap();

        thread::sleep(Duration::from_millis(12));
        port.stop(stream, StopMode::Now).unwrap();

        wait_for_end(&recorder);
        assert!(recorder.audio.lock().len() < 500);
        assert_eq!(engine.stop_count(), 1);
    }

    #[test]
    fn speak_without_observer_is_a_setup_failure() {
        let mut engine = ScriptedEngine::new(vec![]);
        let mut port = engine.open_port(&PortParams::telephony(8000)).unwrap();
        assert!(matches!(
            port.speak_text("x"),
            Err(OratioError::SpeakStart(_))
        ));
    }
}

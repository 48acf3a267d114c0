//! Typed audio frame handed to the telephony channel for playback.

use std::time::Duration;

/// A fixed-size chunk of encoded audio presented to the channel sink.
///
/// u-law carries one byte per sample, so `samples == payload.len()`.
/// Allocated once per emission on the consumer thread.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
    /// Number of audio samples in the payload.
    pub samples: usize,
}

impl AudioFrame {
    /// Build a u-law frame (one byte per sample).
    pub fn ulaw(payload: Vec<u8>) -> Self {
        let samples = payload.len();
        Self { payload, samples }
    }

    /// Playback duration of this frame at the given sample rate.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        samples_to_duration(self.samples, sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Wall-clock duration of `samples` samples at `sample_rate` Hz.
///
/// At 8 kHz one sample is 125 µs, so a 640-sample frame is 80 ms.
pub fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_micros(samples as u64 * 1_000_000 / u64::from(sample_rate))
}

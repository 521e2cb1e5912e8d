//! Voice activity detection.
//!
//! The VAD branch splits in two: a recurrent model
//! ([`crate::inference::VadModel`], ONNX-backed by [`silero::SileroVad`])
//! that turns each 512-sample window into a speech probability, and the
//! pure [`segmenter::VadSegmenter`] state machine that turns the
//! probability stream into speech segments. The split keeps the state
//! machine testable without any inference runtime.

pub mod segmenter;

#[cfg(feature = "onnx")]
pub mod silero;

use crate::SAMPLE_RATE;

/// Samples per millisecond at the fixed input rate.
pub(crate) const SR_PER_MS: u64 = SAMPLE_RATE as u64 / 1000;

/// Silence window that promotes a `temp_end` candidate to `prev_end`,
/// used when a segment is force-closed at max speech length.
const MIN_SILENCE_AT_MAX_SPEECH_MS: u64 = 98;

/// VAD segmentation parameters, in time units; converted to samples
/// where consumed.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Speech probability threshold. The hysteresis gap extends 0.15
    /// below it. Default: 0.5.
    pub threshold: f32,
    /// Silence required to close a segment. Default: 100 ms.
    pub min_silence_ms: u32,
    /// Shorter segments are not finalized. Default: 250 ms.
    pub min_speech_ms: u32,
    /// Segments are force-closed past this length. Default: 30 s.
    pub max_speech_secs: f32,
    /// Padding applied around recorded segment boundaries. Default: 30 ms.
    pub speech_pad_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_ms: 100,
            min_speech_ms: 250,
            max_speech_secs: 30.0,
            speech_pad_ms: 30,
        }
    }
}

impl VadConfig {
    pub fn min_silence_samples(&self) -> u64 {
        u64::from(self.min_silence_ms) * SR_PER_MS
    }

    pub fn min_speech_samples(&self) -> u64 {
        u64::from(self.min_speech_ms) * SR_PER_MS
    }

    pub fn max_speech_samples(&self) -> u64 {
        (f64::from(self.max_speech_secs) * f64::from(SAMPLE_RATE)) as u64
    }

    pub fn speech_pad_samples(&self) -> u64 {
        u64::from(self.speech_pad_ms) * SR_PER_MS
    }

    pub fn min_silence_samples_at_max_speech(&self) -> u64 {
        MIN_SILENCE_AT_MAX_SPEECH_MS * SR_PER_MS
    }
}

/// One finalized speech region, in input-sample units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechSegment {
    pub start: u64,
    pub end: u64,
}

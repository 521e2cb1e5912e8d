//! # hark
//!
//! Streaming wake-word detection engine with co-resident voice activity
//! detection, built for continuous operation on mobile-class CPUs.
//!
//! ## Architecture
//!
//! ```text
//! submit_audio(pcm16)
//!     ├─► samples ──► mel worker ──► mels ──► embedding worker ──┬─► lane[0] ──► wake-word worker ──► on_wake / on_score
//!     │                                                          └─► lane[N] ──► wake-word worker ──► …
//!     └─► vad samples ──► VAD worker ──► on_voice_start / on_voice_end
//! ```
//!
//! Each arrow is a [`buffering::StageBuffer`] handoff (mutex + condvar);
//! each worker is a plain OS thread that blocks on its input buffer and
//! owns one inference session. The host pushes audio with
//! [`HarkEngine::submit_audio`], which never blocks.
//!
//! Model execution goes through the trait seams in [`inference`]; the
//! `onnx` feature (default) provides ONNX Runtime backends, and
//! [`inference::stub`] provides deterministic scripted backends used by
//! the test suite.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;
pub mod vad;

// ── Model contract constants ────────────────────────────────────────────────
// These are fixed by the model files, not configuration.

/// Input sample rate in Hz. No resampling is performed.
pub const SAMPLE_RATE: u32 = 16_000;
/// Base audio chunk, 80 ms at 16 kHz.
pub const CHUNK_SAMPLES: usize = 1_280;
/// Samples consumed per mel inference (320 ms). The mel model owns the STFT.
pub const MEL_FRAME_SAMPLES: usize = 4 * CHUNK_SAMPLES;
/// Mel bands per spectrogram time step.
pub const NUM_MELS: usize = 32;
/// Mel time steps per embedding window (775 ms).
pub const EMB_WINDOW: usize = 76;
/// Mel time steps the embedding window advances per inference (80 ms).
pub const EMB_STEP: usize = 8;
/// Width of one embedding vector.
pub const EMB_FEATURES: usize = 96;
/// Embedding vectors per wake-word classification window.
pub const WW_FEATURES: usize = 16;
/// Samples consumed per VAD inference (32 ms).
pub const VAD_WINDOW_SAMPLES: usize = 512;
/// Look-back samples prepended to every VAD inference window.
pub const VAD_CONTEXT_SAMPLES: usize = 64;
/// VAD recurrent state: 2 layers x 1 batch x 128 units.
pub const VAD_STATE_SIZE: usize = 2 * 1 * 128;

// Convenience re-exports for downstream crates
pub use engine::{EngineConfig, HarkEngine};
pub use error::{HarkError, Result};
pub use events::{EventSink, ScoreUpdate};
pub use inference::{
    DetectorHandle, EmbeddingHandle, EngineModels, MelHandle, VadHandle, WakeWordModel,
};
pub use vad::{SpeechSegment, VadConfig};

#[cfg(feature = "onnx")]
pub use inference::onnx::OrtSession;

#[cfg(feature = "onnx")]
pub use vad::silero::SileroVad;

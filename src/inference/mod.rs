//! Model abstractions for the four pipeline stages.
//!
//! One trait per stage, because the four models have incompatible I/O
//! contracts: the mel model eats raw-range audio frames, the embedding
//! model eats mel windows, the detectors eat embedding windows, and the
//! VAD model is recurrent. The ONNX backends live in [`onnx`] (feature
//! `"onnx"`); deterministic scripted backends live in [`stub`].
//!
//! `&mut self` on the inference methods intentionally expresses that
//! backends are stateful (session scratch space, RNN hidden state). All
//! mutation is serialised through the handles' `parking_lot::Mutex`,
//! which in practice is only ever locked by the one worker that owns
//! the stage.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Mel spectrogram frontend.
pub trait MelModel: Send + 'static {
    /// One forward pass over a full audio frame
    /// ([`crate::MEL_FRAME_SAMPLES`] floats in raw PCM range).
    ///
    /// Returns mel values in time-major order; the length must be a
    /// multiple of [`crate::NUM_MELS`]. Values are returned unscaled —
    /// the mel worker applies the embedding-model rescale.
    fn compute(&mut self, frame: &[f32]) -> Result<Vec<f32>>;
}

/// Shared speech embedding model.
pub trait EmbeddingModel: Send + 'static {
    /// One forward pass over a window of
    /// [`crate::EMB_WINDOW`] x [`crate::NUM_MELS`] mel values.
    ///
    /// Returns a flat sequence of embedding values; the length must be
    /// a multiple of [`crate::EMB_FEATURES`].
    fn embed(&mut self, window: &[f32]) -> Result<Vec<f32>>;
}

/// Per-wake-word classifier head.
pub trait DetectorModel: Send + 'static {
    /// One forward pass over a window of
    /// [`crate::WW_FEATURES`] x [`crate::EMB_FEATURES`] embedding values.
    ///
    /// Returns one or more probabilities in [0, 1].
    fn classify(&mut self, window: &[f32]) -> Result<Vec<f32>>;
}

/// Recurrent voice-activity model.
pub trait VadModel: Send + 'static {
    /// One forward pass over a window of
    /// [`crate::VAD_CONTEXT_SAMPLES`] + [`crate::VAD_WINDOW_SAMPLES`]
    /// normalized samples. Implementations carry their recurrent state
    /// across calls.
    fn forward(&mut self, window: &[f32]) -> Result<f32>;

    /// Zero the recurrent state.
    fn reset(&mut self);
}

macro_rules! model_handle {
    ($(#[$doc:meta])* $name:ident, $model:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name(pub Arc<Mutex<dyn $model>>);

        impl $name {
            pub fn new<M: $model>(model: M) -> Self {
                Self(Arc::new(Mutex::new(model)))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish_non_exhaustive()
            }
        }
    };
}

model_handle!(
    /// Thread-safe handle to a [`MelModel`].
    MelHandle,
    MelModel
);
model_handle!(
    /// Thread-safe handle to an [`EmbeddingModel`].
    EmbeddingHandle,
    EmbeddingModel
);
model_handle!(
    /// Thread-safe handle to a [`DetectorModel`].
    DetectorHandle,
    DetectorModel
);
model_handle!(
    /// Thread-safe handle to a [`VadModel`].
    VadHandle,
    VadModel
);

/// One named wake-word classifier.
#[derive(Debug)]
pub struct WakeWordModel {
    /// Displayable name, passed to the event sink on detection.
    pub name: String,
    pub detector: DetectorHandle,
}

/// The wake-word pipeline's model bundle, installed at
/// [`crate::HarkEngine::initialize`].
#[derive(Debug)]
pub struct EngineModels {
    pub mel: MelHandle,
    pub embedding: EmbeddingHandle,
    /// Ordered list of wake-word classifiers; must be non-empty.
    pub wake_words: Vec<WakeWordModel>,
}

#[cfg(feature = "onnx")]
impl EngineModels {
    /// Load all wake-word-path models from ONNX files.
    ///
    /// Fails synchronously on a missing file or session error, so
    /// configuration problems surface from `initialize` rather than
    /// from a worker thread. Wake-word names are the file stems of the
    /// classifier paths.
    pub fn from_paths(
        mel_path: impl AsRef<Path>,
        embedding_path: impl AsRef<Path>,
        wake_word_paths: &[impl AsRef<Path>],
    ) -> Result<Self> {
        let mel = MelHandle::new(onnx::OnnxMelModel::load(mel_path.as_ref())?);
        let embedding =
            EmbeddingHandle::new(onnx::OnnxEmbeddingModel::load(embedding_path.as_ref())?);
        let wake_words = wake_word_paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                Ok(WakeWordModel {
                    name: wake_word_name(path),
                    detector: DetectorHandle::new(onnx::OnnxDetectorModel::load(path)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mel,
            embedding,
            wake_words,
        })
    }
}

#[cfg(feature = "onnx")]
impl VadHandle {
    /// Load a Silero VAD model from an ONNX file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(crate::vad::silero::SileroVad::load(
            path.as_ref(),
        )?))
    }
}

/// Displayable wake-word name: the model file stem, without directory
/// or extension.
pub fn wake_word_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

//! Deterministic model backends with no inference runtime.
//!
//! Used by the test suite to drive the full pipeline with known frame
//! arithmetic, and usable as placeholder backends when model files are
//! not available. Each backend exposes a shared call counter so tests
//! can assert exactly how many inferences a given input produced.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::inference::{DetectorModel, EmbeddingModel, MelModel, VadModel};
use crate::{EMB_FEATURES, NUM_MELS};

/// Mel frontend stand-in: every audio frame yields a fixed number of
/// constant-valued mel time steps.
pub struct StubMelModel {
    rows_per_frame: usize,
    value: f32,
    calls: Arc<AtomicUsize>,
}

impl StubMelModel {
    /// `rows_per_frame` mel time steps (of [`NUM_MELS`] values each) per
    /// inference. The real frontend produces a model-defined count; the
    /// stub makes it explicit so frame arithmetic is exact in tests.
    pub fn new(rows_per_frame: usize) -> Self {
        Self {
            rows_per_frame,
            value: 0.0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl MelModel for StubMelModel {
    fn compute(&mut self, _frame: &[f32]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(vec![self.value; self.rows_per_frame * NUM_MELS])
    }
}

/// Embedding stand-in: one embedding vector per window, filled with a
/// running sequence number so fan-out order is observable downstream.
pub struct StubEmbeddingModel {
    next_seq: f32,
    calls: Arc<AtomicUsize>,
}

impl StubEmbeddingModel {
    pub fn new() -> Self {
        Self {
            next_seq: 0.0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Default for StubEmbeddingModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for StubEmbeddingModel {
    fn embed(&mut self, _window: &[f32]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let seq = self.next_seq;
        self.next_seq += 1.0;
        Ok(vec![seq; EMB_FEATURES])
    }
}

/// Classifier stand-in that replays a canned probability script, then
/// repeats a default probability forever.
pub struct ScriptedDetector {
    script: VecDeque<f32>,
    default_prob: f32,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = f32>) -> Self {
        Self {
            script: script.into_iter().collect(),
            default_prob: 0.0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Probability returned once the script is exhausted (default 0.0).
    pub fn with_default(mut self, default_prob: f32) -> Self {
        self.default_prob = default_prob;
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl DetectorModel for ScriptedDetector {
    fn classify(&mut self, _window: &[f32]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let prob = self.script.pop_front().unwrap_or(self.default_prob);
        Ok(vec![prob])
    }
}

/// VAD stand-in that replays one scripted probability per window.
pub struct ScriptedVadModel {
    script: VecDeque<f32>,
    default_prob: f32,
    resets: Arc<AtomicUsize>,
}

impl ScriptedVadModel {
    pub fn new(script: impl IntoIterator<Item = f32>) -> Self {
        Self {
            script: script.into_iter().collect(),
            default_prob: 0.0,
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_default(mut self, default_prob: f32) -> Self {
        self.default_prob = default_prob;
        self
    }

    pub fn reset_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.resets)
    }
}

impl VadModel for ScriptedVadModel {
    fn forward(&mut self, _window: &[f32]) -> Result<f32> {
        Ok(self.script.pop_front().unwrap_or(self.default_prob))
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

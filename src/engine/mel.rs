//! Mel spectrogram stage.
//!
//! Consumes raw-range float samples in fixed frames of
//! [`MEL_FRAME_SAMPLES`] (320 ms), runs the mel frontend, rescales each
//! output value, and appends to the mel buffer. Frames never overlap —
//! the mel model implements the STFT internally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::buffering::StageBuffer;
use crate::inference::MelHandle;
use crate::MEL_FRAME_SAMPLES;

/// Rescale applied to every mel value; matches the numerical range the
/// speech embedding model was trained on.
#[inline]
pub(crate) fn rescale(value: f32) -> f32 {
    value / 10.0 + 2.0
}

pub(crate) struct MelStage {
    pub input: Arc<StageBuffer>,
    pub output: Arc<StageBuffer>,
    pub model: MelHandle,
    pub running: Arc<AtomicBool>,
}

pub(crate) fn run(stage: MelStage) {
    info!("mel worker started");

    let mut todo: Vec<f32> = Vec::new();
    let mut scaled: Vec<f32> = Vec::new();

    'outer: loop {
        if !stage.input.drain_into(&mut todo) {
            break;
        }

        while stage.running.load(Ordering::Acquire) && todo.len() >= MEL_FRAME_SAMPLES {
            let mels = match stage.model.0.lock().compute(&todo[..MEL_FRAME_SAMPLES]) {
                Ok(mels) => mels,
                Err(e) => {
                    error!(error = %e, "mel inference failed — stage halted");
                    break 'outer;
                }
            };

            scaled.clear();
            scaled.extend(mels.iter().map(|&v| rescale(v)));
            stage.output.push(&scaled);

            todo.drain(..MEL_FRAME_SAMPLES);
        }
    }

    info!("mel worker exiting");
}

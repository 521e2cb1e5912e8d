//! Voice-activity stage.
//!
//! Consumes normalized samples in fixed [`VAD_WINDOW_SAMPLES`] chunks.
//! Each inference window is the 64-sample context carried from the
//! previous chunk followed by the 512 new samples. The raw segmenter
//! transitions are debounced before they reach the application:
//! `voice-start` is delivered immediately, `voice-end` only after
//! `voice_end_delay` worth of further audio with no speech resumption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::buffering::StageBuffer;
use crate::events::SinkHandle;
use crate::inference::VadHandle;
use crate::vad::segmenter::{VadSegmenter, VadTransition};
use crate::vad::VadConfig;
use crate::{VAD_CONTEXT_SAMPLES, VAD_WINDOW_SAMPLES};

/// Flags shared between the engine front-end and the VAD worker.
pub(crate) struct VadShared {
    /// Audio is only queued to the VAD path while set.
    pub enabled: AtomicBool,
    /// Set on the enable transition; the worker consumes it and zeroes
    /// recurrent state, context, and counters.
    pub reset_requested: AtomicBool,
    /// Application-level voice state (a `voice-start` has been
    /// delivered with no matching `voice-end` yet).
    pub announced: AtomicBool,
}

impl VadShared {
    pub(crate) fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            announced: AtomicBool::new(false),
        }
    }
}

pub(crate) struct VadStage {
    pub input: Arc<StageBuffer>,
    pub model: VadHandle,
    pub shared: Arc<VadShared>,
    pub sink: SinkHandle,
    pub config: VadConfig,
    /// Delayed-end debounce, in samples of submitted audio.
    pub voice_end_delay_samples: u64,
    pub running: Arc<AtomicBool>,
}

pub(crate) fn run(stage: VadStage) {
    info!("VAD worker started");

    let mut todo: Vec<f32> = Vec::new();
    let mut context = [0.0f32; VAD_CONTEXT_SAMPLES];
    let mut window = [0.0f32; VAD_CONTEXT_SAMPLES + VAD_WINDOW_SAMPLES];
    let mut segmenter = VadSegmenter::new(&stage.config);
    // Samples consumed since the raw speech→silence transition, once armed.
    let mut pending_end: Option<u64> = None;

    // A restarted engine must not see stale recurrent state.
    stage.model.0.lock().reset();

    'outer: loop {
        if !stage.input.drain_into(&mut todo) {
            break;
        }

        if stage.shared.reset_requested.swap(false, Ordering::AcqRel) {
            segmenter.reset();
            stage.model.0.lock().reset();
            context = [0.0; VAD_CONTEXT_SAMPLES];
            pending_end = None;
            debug!("VAD state reset");
        }

        if !stage.shared.enabled.load(Ordering::Acquire) {
            // Disabled: discard silently, including any partial chunk.
            todo.clear();
            continue;
        }

        while stage.running.load(Ordering::Acquire) && todo.len() >= VAD_WINDOW_SAMPLES {
            window[..VAD_CONTEXT_SAMPLES].copy_from_slice(&context);
            window[VAD_CONTEXT_SAMPLES..].copy_from_slice(&todo[..VAD_WINDOW_SAMPLES]);

            let prob = match stage.model.0.lock().forward(&window) {
                Ok(prob) => prob,
                Err(e) => {
                    error!(error = %e, "VAD inference failed — stage halted");
                    break 'outer;
                }
            };
            context.copy_from_slice(&window[window.len() - VAD_CONTEXT_SAMPLES..]);

            let mut armed_now = false;
            match segmenter.advance(prob) {
                Some(VadTransition::Started) => {
                    if pending_end.take().is_some() {
                        debug!("speech resumed within end delay — pending end cancelled");
                    } else if !stage.shared.announced.swap(true, Ordering::AcqRel) {
                        debug!(sample = segmenter.current_sample(), "voice activity started");
                        stage.sink.voice_start();
                    }
                }
                Some(VadTransition::Ended) => {
                    if stage.shared.announced.load(Ordering::Acquire) && pending_end.is_none() {
                        pending_end = Some(0);
                        armed_now = true;
                    }
                }
                None => {}
            }

            // The delay counts audio submitted after the transition, so
            // the arming chunk itself is excluded.
            if !armed_now {
                if let Some(counted) = pending_end {
                    let counted = counted + VAD_WINDOW_SAMPLES as u64;
                    if counted >= stage.voice_end_delay_samples {
                        pending_end = None;
                        if stage.shared.announced.swap(false, Ordering::AcqRel) {
                            debug!(sample = segmenter.current_sample(), "voice activity ended");
                            stage.sink.voice_end();
                        }
                    } else {
                        pending_end = Some(counted);
                    }
                }
            }

            todo.drain(..VAD_WINDOW_SAMPLES);
        }
    }

    info!("VAD worker exiting");
}

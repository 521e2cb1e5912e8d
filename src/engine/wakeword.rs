//! Wake-word classification stage, one instance per configured wake word.
//!
//! Consumes embedding vectors with a sliding window of [`WW_FEATURES`]
//! vectors, advancing one vector per classification, and debounces the
//! classifier output through a hysteretic [`Activation`] counter with a
//! post-trigger refractory period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::engine::WakeWordLane;
use crate::events::{ScoreUpdate, SinkHandle};
use crate::{EMB_FEATURES, WW_FEATURES};

/// Log every Nth score so continuous operation does not flood logs.
const SCORE_LOG_EVERY: usize = 20;

/// Hysteretic activation counter.
///
/// Above-threshold scores push the counter up; at `trigger_level` the
/// wake fires and the counter drops to `-refractory`, suppressing
/// re-triggers until it decays back through zero. Below-threshold
/// scores decay the counter one step toward zero from either side, so
/// at every step boundary `-refractory <= counter <= trigger_level`.
pub(crate) struct Activation {
    threshold: f32,
    trigger_level: i32,
    refractory: i32,
    counter: i32,
}

impl Activation {
    pub(crate) fn new(threshold: f32, trigger_level: i32, refractory: i32) -> Self {
        Self {
            threshold,
            trigger_level,
            refractory,
            counter: 0,
        }
    }

    /// Feed one classifier score; returns `true` when the wake fires.
    pub(crate) fn observe(&mut self, prob: f32) -> bool {
        if prob > self.threshold {
            self.counter += 1;
            if self.counter >= self.trigger_level {
                self.counter = -self.refractory;
                return true;
            }
        } else if self.counter > 0 {
            self.counter = (self.counter - 1).max(0);
        } else {
            self.counter = (self.counter + 1).min(0);
        }
        false
    }

    pub(crate) fn level(&self) -> i32 {
        self.counter
    }
}

pub(crate) struct WakeWordStage {
    pub lane: Arc<WakeWordLane>,
    pub sink: SinkHandle,
    pub threshold: f32,
    pub trigger_level: i32,
    pub refractory: i32,
    pub running: Arc<AtomicBool>,
}

pub(crate) fn run(stage: WakeWordStage) {
    let name = stage.lane.name.clone();
    info!(wake_word = %name, "wake-word worker started");

    let mut todo: Vec<f32> = Vec::new();
    let mut activation = Activation::new(stage.threshold, stage.trigger_level, stage.refractory);
    let mut log_counter = 0usize;

    'outer: loop {
        if !stage.lane.buffer.drain_into(&mut todo) {
            break;
        }

        while stage.running.load(Ordering::Acquire) && todo.len() / EMB_FEATURES >= WW_FEATURES {
            let window = &todo[..WW_FEATURES * EMB_FEATURES];
            let probabilities = match stage.lane.detector.0.lock().classify(window) {
                Ok(probabilities) => probabilities,
                Err(e) => {
                    error!(wake_word = %name, error = %e, "classifier inference failed — stage halted");
                    break 'outer;
                }
            };

            for prob in probabilities {
                log_counter += 1;
                if log_counter % SCORE_LOG_EVERY == 0 || prob > stage.threshold * 0.7 {
                    debug!(
                        wake_word = %name,
                        score = prob,
                        activation = activation.level(),
                        trigger_level = stage.trigger_level,
                        "detection score"
                    );
                }

                let fired = activation.observe(prob);
                stage.sink.score(&ScoreUpdate {
                    wake_word: name.clone(),
                    score: prob,
                    threshold: stage.threshold,
                    activation: activation.level(),
                    trigger_level: stage.trigger_level,
                });

                if fired {
                    info!(wake_word = %name, score = prob, "wake word detected");
                    stage.sink.wake(&name);
                }
            }

            todo.drain(..EMB_FEATURES);
        }
    }

    info!(wake_word = %name, "wake-word worker exiting");
}

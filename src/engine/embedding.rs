//! Speech embedding stage.
//!
//! Consumes mel values with a sliding window of [`EMB_WINDOW`] time
//! steps, advancing [`EMB_STEP`] steps per inference, and fans the
//! resulting embedding vectors out to every wake-word lane. All lanes
//! receive identical bytes in identical order — there is exactly one
//! producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::buffering::StageBuffer;
use crate::engine::WakeWordLane;
use crate::inference::EmbeddingHandle;
use crate::{EMB_STEP, EMB_WINDOW, NUM_MELS};

pub(crate) struct EmbeddingStage {
    pub input: Arc<StageBuffer>,
    pub lanes: Vec<Arc<WakeWordLane>>,
    pub model: EmbeddingHandle,
    pub running: Arc<AtomicBool>,
}

pub(crate) fn run(stage: EmbeddingStage) {
    info!(lanes = stage.lanes.len(), "embedding worker started");

    let mut todo: Vec<f32> = Vec::new();

    'outer: loop {
        if !stage.input.drain_into(&mut todo) {
            break;
        }

        while stage.running.load(Ordering::Acquire) && todo.len() >= EMB_WINDOW * NUM_MELS {
            let embeddings = match stage.model.0.lock().embed(&todo[..EMB_WINDOW * NUM_MELS]) {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    error!(error = %e, "embedding inference failed — stage halted");
                    break 'outer;
                }
            };

            for lane in &stage.lanes {
                lane.buffer.push(&embeddings);
            }

            todo.drain(..EMB_STEP * NUM_MELS);
        }
    }

    info!("embedding worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::{Duration, Instant};

    use crate::inference::stub::StubEmbeddingModel;
    use crate::inference::DetectorHandle;
    use crate::{inference::stub::ScriptedDetector, EMB_FEATURES};

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn lane(name: &str) -> Arc<WakeWordLane> {
        Arc::new(WakeWordLane {
            name: name.to_string(),
            detector: DetectorHandle::new(ScriptedDetector::new([])),
            buffer: StageBuffer::new(),
        })
    }

    #[test]
    fn window_arithmetic_and_identical_fan_out() {
        let model = StubEmbeddingModel::new();
        let calls = model.call_counter();

        let lanes = vec![lane("alpha"), lane("bravo")];
        let stage = EmbeddingStage {
            input: Arc::new(StageBuffer::new()),
            lanes: lanes.clone(),
            model: EmbeddingHandle::new(model),
            running: Arc::new(AtomicBool::new(true)),
        };
        let input = Arc::clone(&stage.input);

        let worker = thread::spawn(move || run(stage));

        // 100 mel time steps: windows start at steps 0, 8, 16, 24 —
        // ((100 - 76) / 8) + 1 = 4 inferences, leaving 68 steps buffered.
        input.push(&vec![2.0; 100 * NUM_MELS]);
        assert!(wait_until(Duration::from_secs(2), || {
            calls.load(Ordering::Relaxed) == 4
        }));

        // 8 more steps complete the next window (68 + 8 = 76).
        input.push(&vec![2.0; 8 * NUM_MELS]);
        assert!(wait_until(Duration::from_secs(2), || {
            calls.load(Ordering::Relaxed) == 5
        }));

        input.close();
        worker.join().expect("embedding worker panicked");

        let mut first = Vec::new();
        let mut second = Vec::new();
        assert!(lanes[0].buffer.drain_into(&mut first));
        assert!(lanes[1].buffer.drain_into(&mut second));
        assert_eq!(first.len(), 5 * EMB_FEATURES);
        assert_eq!(first, second);

        // The stub fills each embedding with its sequence number, so
        // ordering is observable.
        for (i, chunk) in first.chunks(EMB_FEATURES).enumerate() {
            assert!(chunk.iter().all(|&v| v == i as f32));
        }
    }
}

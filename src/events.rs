//! Engine events and the sink they are delivered through.
//!
//! The engine never holds a reference into the host's object graph: the
//! host injects an [`EventSink`] capability at `start()` and the engine
//! releases it again at `stop()`. Events may be delivered from any
//! worker thread; sinks must be thread-safe or marshal to their own
//! executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Receiver for engine events.
///
/// `on_score` has a default no-op body — it exists for UI meters and
/// most hosts ignore it.
pub trait EventSink: Send + Sync + 'static {
    /// A wake word fired. `wake_word` is the model file stem.
    fn on_wake(&self, wake_word: &str);

    /// One classifier step completed (per wake word, roughly every 80 ms).
    fn on_score(&self, _update: &ScoreUpdate) {}

    /// Voice activity began.
    fn on_voice_start(&self);

    /// Voice activity ended (debounced; see the engine's delayed-end rule).
    fn on_voice_end(&self);
}

/// Per-classification-step detection state, for UI score meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    /// Wake-word name (model file stem).
    pub wake_word: String,
    /// Raw classifier probability in [0, 1].
    pub score: f32,
    /// Configured detection threshold.
    pub threshold: f32,
    /// Activation counter after this step, in [-refractory, trigger_level].
    pub activation: i32,
    /// Activation count required to fire.
    pub trigger_level: i32,
}

/// Shared handle to the installed sink plus a delivery gate.
///
/// The gate is closed before `stop()` returns, so an abandoned worker
/// (join timeout) can never deliver an event after shutdown.
#[derive(Clone)]
pub(crate) struct SinkHandle {
    inner: Arc<SinkState>,
}

struct SinkState {
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    gate: AtomicBool,
}

impl SinkHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SinkState {
                sink: Mutex::new(None),
                gate: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn install(&self, sink: Arc<dyn EventSink>) {
        *self.inner.sink.lock() = Some(sink);
        self.inner.gate.store(true, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.inner.gate.store(false, Ordering::Release);
        *self.inner.sink.lock() = None;
    }

    fn current(&self) -> Option<Arc<dyn EventSink>> {
        if !self.inner.gate.load(Ordering::Acquire) {
            return None;
        }
        self.inner.sink.lock().clone()
    }

    pub(crate) fn wake(&self, wake_word: &str) {
        if let Some(sink) = self.current() {
            sink.on_wake(wake_word);
        }
    }

    pub(crate) fn score(&self, update: &ScoreUpdate) {
        if let Some(sink) = self.current() {
            sink.on_score(update);
        }
    }

    pub(crate) fn voice_start(&self) {
        if let Some(sink) = self.current() {
            sink.on_voice_start();
        }
    }

    pub(crate) fn voice_end(&self) {
        if let Some(sink) = self.current() {
            sink.on_voice_end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn score_update_serializes_with_camel_case_fields() {
        let update = ScoreUpdate {
            wake_word: "hey_jarvis".into(),
            score: 0.82,
            threshold: 0.5,
            activation: 1,
            trigger_level: 1,
        };

        let json = serde_json::to_value(&update).expect("serialize score update");
        assert_eq!(json["wakeWord"], "hey_jarvis");
        let score = json["score"].as_f64().expect("score should be a number");
        assert!((score - 0.82).abs() < 1e-5);
        assert_eq!(json["activation"], 1);
        assert_eq!(json["triggerLevel"], 1);

        let round_trip: ScoreUpdate =
            serde_json::from_value(json).expect("deserialize score update");
        assert_eq!(round_trip.wake_word, "hey_jarvis");
        assert_eq!(round_trip.trigger_level, 1);
    }

    struct CountingSink {
        wakes: AtomicUsize,
    }

    impl EventSink for CountingSink {
        fn on_wake(&self, _wake_word: &str) {
            self.wakes.fetch_add(1, Ordering::Relaxed);
        }
        fn on_voice_start(&self) {}
        fn on_voice_end(&self) {}
    }

    #[test]
    fn gated_handle_drops_events_after_clear() {
        let sink = Arc::new(CountingSink {
            wakes: AtomicUsize::new(0),
        });
        let handle = SinkHandle::new();

        handle.wake("before-install");
        assert_eq!(sink.wakes.load(Ordering::Relaxed), 0);

        handle.install(sink.clone());
        handle.wake("installed");
        assert_eq!(sink.wakes.load(Ordering::Relaxed), 1);

        handle.clear();
        handle.wake("after-clear");
        assert_eq!(sink.wakes.load(Ordering::Relaxed), 1);
    }
}

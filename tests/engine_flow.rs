//! End-to-end wake-word path scenarios, driven with the deterministic
//! stub backends so frame arithmetic is exact.
//!
//! With `StubMelModel::new(8)`, each 5120-sample audio frame yields 8
//! mel time steps and each embedding window yields one embedding, so
//! after `k` submitted frames the pipeline has performed
//! `k` mel inferences, `k - 9` embedding inferences (for `k >= 10`),
//! and `k - 24` classifications per wake word (for `k >= 25`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use hark::inference::stub::{ScriptedDetector, StubEmbeddingModel, StubMelModel};
use hark::{
    DetectorHandle, EmbeddingHandle, EngineConfig, EngineModels, EventSink, HarkEngine, MelHandle,
    ScoreUpdate, WakeWordModel, MEL_FRAME_SAMPLES,
};

#[derive(Default)]
struct RecordingSink {
    wakes: Mutex<Vec<String>>,
    scores: AtomicUsize,
    voice_starts: AtomicUsize,
    voice_ends: AtomicUsize,
}

impl RecordingSink {
    fn wake_count(&self) -> usize {
        self.wakes.lock().len()
    }

    fn wake_names(&self) -> Vec<String> {
        self.wakes.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_wake(&self, wake_word: &str) {
        self.wakes.lock().push(wake_word.to_string());
    }

    fn on_score(&self, _update: &ScoreUpdate) {
        self.scores.fetch_add(1, Ordering::Relaxed);
    }

    fn on_voice_start(&self) {
        self.voice_starts.fetch_add(1, Ordering::Relaxed);
    }

    fn on_voice_end(&self) {
        self.voice_ends.fetch_add(1, Ordering::Relaxed);
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn stub_engine(wake_words: Vec<(&str, ScriptedDetector)>) -> HarkEngine {
    let engine = HarkEngine::new(EngineConfig::default());
    engine
        .initialize(EngineModels {
            mel: MelHandle::new(StubMelModel::new(8)),
            embedding: EmbeddingHandle::new(StubEmbeddingModel::new()),
            wake_words: wake_words
                .into_iter()
                .map(|(name, detector)| WakeWordModel {
                    name: name.to_string(),
                    detector: DetectorHandle::new(detector),
                })
                .collect(),
        })
        .expect("initialize stub engine");
    engine
}

fn submit_frames(engine: &HarkEngine, frames: usize) {
    // Submit in odd-sized chunks so frame boundaries never line up with
    // submission boundaries.
    let total = frames * MEL_FRAME_SAMPLES;
    let chunk = vec![0i16; 1_000];
    let mut submitted = 0;
    while submitted < total {
        let n = chunk.len().min(total - submitted);
        engine.submit_audio(&chunk[..n]);
        submitted += n;
    }
}

#[test]
fn silence_in_silence_out() {
    let engine = stub_engine(vec![("porcupine", ScriptedDetector::new([]))]);
    let sink = Arc::new(RecordingSink::default());
    engine.start(sink.clone()).expect("start");

    submit_frames(&engine, 30);

    // 30 frames → 6 classifications; the pipeline demonstrably ran…
    assert!(wait_until(Duration::from_secs(5), || {
        sink.scores.load(Ordering::Relaxed) >= 6
    }));
    // …and produced no events.
    assert_eq!(sink.wake_count(), 0);
    assert_eq!(sink.voice_starts.load(Ordering::Relaxed), 0);
    assert_eq!(sink.voice_ends.load(Ordering::Relaxed), 0);

    engine.stop();
}

#[test]
fn positive_clip_fires_exactly_once() {
    let engine = stub_engine(vec![("jarvis", ScriptedDetector::new([0.9]))]);
    let sink = Arc::new(RecordingSink::default());
    engine.start(sink.clone()).expect("start");

    submit_frames(&engine, 30);
    assert!(wait_until(Duration::from_secs(5), || sink.wake_count() == 1));
    assert_eq!(sink.wake_names(), vec!["jarvis".to_string()]);

    // More audio with sub-threshold scores must not re-trigger.
    submit_frames(&engine, 10);
    assert!(wait_until(Duration::from_secs(5), || {
        sink.scores.load(Ordering::Relaxed) >= 16
    }));
    assert_eq!(sink.wake_count(), 1);

    engine.stop();
}

#[test]
fn refractory_suppresses_an_immediate_second_clip() {
    // Continuously positive scores: the wake fires on the first
    // classification, then the counter sits at -refractory and needs 21
    // further positive steps to fire again. 50 frames → 26
    // classifications → exactly two wakes.
    let engine = stub_engine(vec![(
        "jarvis",
        ScriptedDetector::new([]).with_default(0.9),
    )]);
    let sink = Arc::new(RecordingSink::default());
    engine.start(sink.clone()).expect("start");

    submit_frames(&engine, 50);
    assert!(wait_until(Duration::from_secs(5), || {
        sink.scores.load(Ordering::Relaxed) >= 26
    }));
    assert_eq!(sink.wake_count(), 2);

    engine.stop();
}

#[test]
fn two_wake_words_fire_in_stream_order() {
    // "alpha" fires on its 1st classification, "bravo" on its 4th.
    let engine = stub_engine(vec![
        ("alpha", ScriptedDetector::new([0.9])),
        ("bravo", ScriptedDetector::new([0.0, 0.0, 0.0, 0.9])),
    ]);
    let sink = Arc::new(RecordingSink::default());
    engine.start(sink.clone()).expect("start");

    // 25 frames: exactly one classification per wake word.
    submit_frames(&engine, 25);
    assert!(wait_until(Duration::from_secs(5), || sink.wake_count() == 1));
    assert_eq!(sink.wake_names(), vec!["alpha".to_string()]);

    // 3 more frames reach bravo's 4th classification.
    submit_frames(&engine, 3);
    assert!(wait_until(Duration::from_secs(5), || sink.wake_count() == 2));
    assert_eq!(
        sink.wake_names(),
        vec!["alpha".to_string(), "bravo".to_string()]
    );

    engine.stop();
}

#[test]
fn stop_is_bounded_and_silences_the_engine() {
    let engine = stub_engine(vec![(
        "jarvis",
        ScriptedDetector::new([]).with_default(0.9),
    )]);
    let sink = Arc::new(RecordingSink::default());
    engine.start(sink.clone()).expect("start");

    submit_frames(&engine, 30);
    assert!(wait_until(Duration::from_secs(5), || sink.wake_count() >= 1));

    let stop_started = Instant::now();
    engine.stop();
    assert!(stop_started.elapsed() < Duration::from_secs(3));

    // No event may be delivered after stop() returns.
    let wakes_at_stop = sink.wake_count();
    let scores_at_stop = sink.scores.load(Ordering::Relaxed);
    submit_frames(&engine, 30);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(sink.wake_count(), wakes_at_stop);
    assert_eq!(sink.scores.load(Ordering::Relaxed), scores_at_stop);
}

#[test]
fn engine_restarts_cleanly_after_stop() {
    let engine = stub_engine(vec![(
        "jarvis",
        ScriptedDetector::new([]).with_default(0.9),
    )]);
    let sink = Arc::new(RecordingSink::default());
    engine.start(sink.clone()).expect("start");

    submit_frames(&engine, 30);
    assert!(wait_until(Duration::from_secs(5), || sink.wake_count() >= 1));
    engine.stop();

    let fresh_sink = Arc::new(RecordingSink::default());
    engine.start(fresh_sink.clone()).expect("restart");
    submit_frames(&engine, 30);
    assert!(wait_until(Duration::from_secs(5), || {
        fresh_sink.wake_count() >= 1
    }));
    engine.stop();
}

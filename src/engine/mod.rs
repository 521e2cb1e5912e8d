//! `HarkEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! HarkEngine::new(config)
//!     └─► initialize(models)        → lanes built, models installed
//!         └─► initialize_vad(vad)   → optional
//!             └─► start(sink)       → 3 + N workers spawned, running = true
//!                 └─► submit_audio()* (never blocks)
//!                     └─► stop()    → buffers closed, workers joined (2 s
//!                                     timeout each), sink released
//! ```
//!
//! `start()` on a running engine returns `Ok` without restarting;
//! `stop()` is idempotent; a stopped engine can be started again.
//!
//! ## Threading
//!
//! One OS thread per stage: mel, embedding, one per wake word, and VAD.
//! Workers block on their stage buffer's condvar and exit when the
//! buffer closes. There is no way to force-kill a thread in the target
//! environments, so a worker that misses the join timeout is abandoned
//! with a warning rather than killed.

pub(crate) mod embedding;
pub(crate) mod mel;
pub(crate) mod vad;
pub(crate) mod wakeword;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::buffering::StageBuffer;
use crate::error::{HarkError, Result};
use crate::events::{EventSink, SinkHandle};
use crate::inference::{DetectorHandle, EmbeddingHandle, EngineModels, MelHandle, VadHandle};
use crate::vad::{VadConfig, SR_PER_MS};

use self::vad::VadShared;

/// Configuration for [`HarkEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Classifier probability threshold. Default: 0.5.
    pub threshold: f32,
    /// Above-threshold classifier steps required to fire. Default: 1.
    pub trigger_level: i32,
    /// Post-trigger suppression window, in classifier steps. Default: 20.
    pub refractory: i32,
    /// Delayed-end debounce on the application-facing `voice-end`
    /// event, in milliseconds of submitted audio. Default: 500.
    pub voice_end_delay_ms: u32,
    /// Per-worker join budget during `stop()`. Default: 2 s.
    pub join_timeout: Duration,
    /// VAD segmentation parameters.
    pub vad: VadConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            trigger_level: 1,
            refractory: 20,
            voice_end_delay_ms: 500,
            join_timeout: Duration::from_secs(2),
            vad: VadConfig::default(),
        }
    }
}

/// One wake-word stage: its name, classifier, and dedicated embedding
/// buffer, so each stage owns all of its own synchronization.
pub(crate) struct WakeWordLane {
    pub(crate) name: String,
    pub(crate) detector: DetectorHandle,
    pub(crate) buffer: StageBuffer,
}

struct Installed {
    mel: MelHandle,
    embedding: EmbeddingHandle,
    lanes: Vec<Arc<WakeWordLane>>,
}

struct WorkerHandle {
    label: String,
    handle: thread::JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

/// The streaming wake-word + VAD engine.
///
/// `HarkEngine` is `Send + Sync`; all fields use interior mutability,
/// so it can be shared behind an `Arc` between the audio source and a
/// control surface.
pub struct HarkEngine {
    config: EngineConfig,
    running: Arc<AtomicBool>,
    installed: Mutex<Option<Installed>>,
    vad_model: Mutex<Option<VadHandle>>,
    samples: Arc<StageBuffer>,
    mels: Arc<StageBuffer>,
    vad_samples: Arc<StageBuffer>,
    vad_shared: Arc<VadShared>,
    sink: SinkHandle,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl HarkEngine {
    /// Create an engine. No models are loaded and nothing runs yet.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            installed: Mutex::new(None),
            vad_model: Mutex::new(None),
            samples: Arc::new(StageBuffer::new()),
            mels: Arc::new(StageBuffer::new()),
            vad_samples: Arc::new(StageBuffer::new()),
            vad_shared: Arc::new(VadShared::new()),
            sink: SinkHandle::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Install the wake-word pipeline models.
    ///
    /// # Errors
    /// - [`HarkError::AlreadyRunning`] while started.
    /// - [`HarkError::NoWakeWordModels`] on an empty wake-word list.
    pub fn initialize(&self, models: EngineModels) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(HarkError::AlreadyRunning);
        }
        if models.wake_words.is_empty() {
            return Err(HarkError::NoWakeWordModels);
        }

        let lanes: Vec<Arc<WakeWordLane>> = models
            .wake_words
            .into_iter()
            .map(|ww| {
                Arc::new(WakeWordLane {
                    name: ww.name,
                    detector: ww.detector,
                    buffer: StageBuffer::new(),
                })
            })
            .collect();
        let names: Vec<String> = lanes.iter().map(|lane| lane.name.clone()).collect();

        *self.installed.lock() = Some(Installed {
            mel: models.mel,
            embedding: models.embedding,
            lanes,
        });

        info!(wake_words = ?names, "engine initialized");
        Ok(())
    }

    /// Install the VAD model. Optional; without it no voice events fire.
    pub fn initialize_vad(&self, model: VadHandle) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(HarkError::AlreadyRunning);
        }
        *self.vad_model.lock() = Some(model);
        info!("VAD initialized");
        Ok(())
    }

    /// Enable or disable the VAD path.
    ///
    /// Enabling resets the VAD state (recurrent state, context,
    /// counters). Disabling mid-speech delivers the outstanding
    /// `voice-end` first. While disabled, submitted audio is silently
    /// discarded on the VAD path — there is no backfill on re-enable.
    pub fn enable_vad(&self, enabled: bool) -> Result<()> {
        if self.vad_model.lock().is_none() {
            return Err(HarkError::VadNotInitialized);
        }

        let was = self.vad_shared.enabled.swap(enabled, Ordering::AcqRel);
        if enabled && !was {
            self.vad_samples.clear();
            self.vad_shared.reset_requested.store(true, Ordering::Release);
            debug!("VAD enabled, state reset requested");
        } else if !enabled && was {
            self.vad_samples.clear();
            if self.vad_shared.announced.swap(false, Ordering::AcqRel) {
                self.sink.voice_end();
            }
            debug!("VAD disabled");
        }
        Ok(())
    }

    /// Start the pipeline workers and begin delivering events to `sink`.
    ///
    /// Idempotent while running. Fails with [`HarkError::NotInitialized`]
    /// before [`initialize`](Self::initialize).
    pub fn start(&self, sink: Arc<dyn EventSink>) -> Result<()> {
        let installed_guard = self.installed.lock();
        let installed = installed_guard.as_ref().ok_or(HarkError::NotInitialized)?;

        if self.running.swap(true, Ordering::SeqCst) {
            info!("engine already running");
            return Ok(());
        }

        self.sink.install(sink);
        self.samples.reopen();
        self.mels.reopen();
        self.vad_samples.reopen();
        for lane in &installed.lanes {
            lane.buffer.reopen();
        }

        let mut workers = self.workers.lock();
        workers.clear();

        if let Err(e) = self.spawn_all(&mut workers, installed) {
            error!(error = %e, "failed to spawn pipeline workers");
            self.running.store(false, Ordering::SeqCst);
            self.close_buffers(&installed.lanes);
            for worker in workers.drain(..) {
                join_worker(worker, self.config.join_timeout);
            }
            self.sink.clear();
            return Err(e);
        }

        info!(
            workers = workers.len(),
            wake_words = installed.lanes.len(),
            "engine started"
        );
        Ok(())
    }

    fn spawn_all(&self, workers: &mut Vec<WorkerHandle>, installed: &Installed) -> Result<()> {
        let stage = mel::MelStage {
            input: Arc::clone(&self.samples),
            output: Arc::clone(&self.mels),
            model: installed.mel.clone(),
            running: Arc::clone(&self.running),
        };
        spawn_worker("hark-mel".to_string(), workers, move || mel::run(stage))?;

        let stage = embedding::EmbeddingStage {
            input: Arc::clone(&self.mels),
            lanes: installed.lanes.clone(),
            model: installed.embedding.clone(),
            running: Arc::clone(&self.running),
        };
        spawn_worker("hark-embedding".to_string(), workers, move || {
            embedding::run(stage)
        })?;

        for lane in &installed.lanes {
            let stage = wakeword::WakeWordStage {
                lane: Arc::clone(lane),
                sink: self.sink.clone(),
                threshold: self.config.threshold,
                trigger_level: self.config.trigger_level,
                refractory: self.config.refractory,
                running: Arc::clone(&self.running),
            };
            spawn_worker(format!("hark-ww-{}", lane.name), workers, move || {
                wakeword::run(stage)
            })?;
        }

        if let Some(vad_model) = self.vad_model.lock().clone() {
            let stage = vad::VadStage {
                input: Arc::clone(&self.vad_samples),
                model: vad_model,
                shared: Arc::clone(&self.vad_shared),
                sink: self.sink.clone(),
                config: self.config.vad.clone(),
                voice_end_delay_samples: u64::from(self.config.voice_end_delay_ms) * SR_PER_MS,
                running: Arc::clone(&self.running),
            };
            spawn_worker("hark-vad".to_string(), workers, move || vad::run(stage))?;
        }

        Ok(())
    }

    /// Feed 16 kHz mono s16le samples. Never blocks, never drops;
    /// ignored when the engine is not running.
    pub fn submit_audio(&self, samples: &[i16]) {
        if samples.is_empty() || !self.running.load(Ordering::Acquire) {
            return;
        }

        // Wake-word path: raw-range floats (the mel model's contract).
        let raw: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();
        self.samples.push(&raw);

        // VAD path: normalized to [-1, 1] (the VAD model's contract).
        if self.vad_shared.enabled.load(Ordering::Acquire) {
            let normalized: Vec<f32> = samples.iter().map(|&s| f32::from(s) / 32_768.0).collect();
            self.vad_samples.push(&normalized);
        }
    }

    /// Stop the pipeline. Idempotent. After return, no worker is
    /// running (or it has been abandoned with a warning) and no event
    /// will be delivered.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("engine stop requested");

        self.vad_shared.enabled.store(false, Ordering::Release);
        self.vad_shared.announced.store(false, Ordering::Release);

        {
            let installed = self.installed.lock();
            let lanes = installed
                .as_ref()
                .map(|i| i.lanes.as_slice())
                .unwrap_or(&[]);
            self.close_buffers(lanes);
        }

        let timeout = self.config.join_timeout;
        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            join_worker(worker, timeout);
        }
        drop(workers);

        // Gate closes before return: an abandoned worker can no longer
        // deliver anything.
        self.sink.clear();

        let installed = self.installed.lock();
        self.samples.clear();
        self.mels.clear();
        self.vad_samples.clear();
        if let Some(installed) = installed.as_ref() {
            for lane in &installed.lanes {
                lane.buffer.clear();
            }
        }

        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn close_buffers(&self, lanes: &[Arc<WakeWordLane>]) {
        self.samples.close();
        self.mels.close();
        self.vad_samples.close();
        for lane in lanes {
            lane.buffer.close();
        }
    }
}

impl Drop for HarkEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_worker(
    label: String,
    workers: &mut Vec<WorkerHandle>,
    body: impl FnOnce() + Send + 'static,
) -> Result<()> {
    let (done_tx, done_rx) = mpsc::channel();
    let handle = thread::Builder::new().name(label.clone()).spawn(move || {
        body();
        let _ = done_tx.send(());
    })?;
    workers.push(WorkerHandle {
        label,
        handle,
        done_rx,
    });
    Ok(())
}

fn join_worker(worker: WorkerHandle, timeout: Duration) {
    match worker.done_rx.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if worker.handle.join().is_err() {
                warn!(worker = %worker.label, "worker thread panicked");
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                worker = %worker.label,
                timeout_ms = timeout.as_millis() as u64,
                "worker did not stop within the join timeout — abandoning thread"
            );
        }
    }
}

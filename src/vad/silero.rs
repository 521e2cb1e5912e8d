//! Silero VAD neural voice activity detector.
//!
//! Wraps the Silero VAD ONNX model published at
//! <https://github.com/snakers4/silero-vad> (v5 GRU interface).
//!
//! ## Model I/O
//!
//! | Name     | Shape       | DType | Direction |
//! |----------|-------------|-------|-----------|
//! | `input`  | `[1, 576]`  | f32   | in        |
//! | `state`  | `[2,1,128]` | f32   | in/out    |
//! | `sr`     | `[1]`       | i64   | in        |
//! | `output` | `[1, 1]`    | f32   | out       |
//! | `stateN` | `[2,1,128]` | f32   | out       |
//!
//! The 576-float input is 64 samples of carried context followed by the
//! 512 new samples; the VAD worker assembles it. `stateN` is copied
//! back over `state` between calls.

use std::path::Path;

use ndarray::{Array1, Array2, Array3};
use ort::session::SessionInputValue;
use ort::value::Value;
use tracing::info;

use crate::error::{HarkError, Result};
use crate::inference::onnx::{inference_err, resolve_name, OrtSession};
use crate::inference::VadModel;
use crate::{SAMPLE_RATE, VAD_CONTEXT_SAMPLES, VAD_STATE_SIZE, VAD_WINDOW_SAMPLES};

pub struct SileroVad {
    session: OrtSession,
    input_name: String,
    state_name: String,
    sr_name: Option<String>,
    prob_index: usize,
    state_index: usize,
    state: Vec<f32>,
}

impl SileroVad {
    /// Load the Silero VAD model and resolve its tensor names.
    pub fn load(path: &Path) -> Result<Self> {
        let session = OrtSession::open(path)?;

        let input_name = resolve_name(session.input_names(), &["input", "audio", "x"])
            .or_else(|| session.input_names().first().cloned())
            .ok_or_else(|| HarkError::Session("VAD model has no inputs".into()))?;
        let state_name = resolve_name(session.input_names(), &["state", "h_0", "hidden"])
            .ok_or_else(|| HarkError::Session("VAD model has no state input".into()))?;
        let sr_name = resolve_name(session.input_names(), &["sr", "sample_rate"]);

        let prob_name = resolve_name(session.output_names(), &["output", "speech_prob", "prob"])
            .or_else(|| session.output_names().first().cloned())
            .ok_or_else(|| HarkError::Session("VAD model has no outputs".into()))?;
        let state_out_name =
            resolve_name(session.output_names(), &["stateN", "state_out", "hn"])
                .ok_or_else(|| HarkError::Session("VAD model has no state output".into()))?;

        let position = |name: &str| {
            session
                .output_names()
                .iter()
                .position(|candidate| candidate == name)
        };
        let prob_index = position(&prob_name)
            .ok_or_else(|| HarkError::Session("VAD output name not in output list".into()))?;
        let state_index = position(&state_out_name)
            .ok_or_else(|| HarkError::Session("VAD state name not in output list".into()))?;

        info!(
            path = %path.display(),
            input = %input_name,
            state = %state_name,
            sr = ?sr_name,
            "Silero VAD ready"
        );

        Ok(Self {
            session,
            input_name,
            state_name,
            sr_name,
            prob_index,
            state_index,
            state: vec![0.0; VAD_STATE_SIZE],
        })
    }
}

impl VadModel for SileroVad {
    fn forward(&mut self, window: &[f32]) -> Result<f32> {
        debug_assert_eq!(window.len(), VAD_CONTEXT_SAMPLES + VAD_WINDOW_SAMPLES);

        let input = Array2::from_shape_vec((1, window.len()), window.to_vec())
            .map_err(|e| HarkError::Inference(e.to_string()))?;
        let state = Array3::from_shape_vec((2, 1, 128), self.state.clone())
            .map_err(|e| HarkError::Inference(e.to_string()))?;

        let input_value = Value::from_array(input).map_err(inference_err)?;
        let state_value = Value::from_array(state).map_err(inference_err)?;

        let mut inputs: Vec<(String, SessionInputValue<'static>)> = vec![
            (self.input_name.clone(), input_value.into()),
            (self.state_name.clone(), state_value.into()),
        ];
        if let Some(sr_name) = &self.sr_name {
            let sr = Array1::<i64>::from_elem(1, i64::from(SAMPLE_RATE));
            let sr_value = Value::from_array(sr).map_err(inference_err)?;
            inputs.push((sr_name.clone(), sr_value.into()));
        }

        let mut outputs = self.session.run(inputs)?;

        let new_state = std::mem::take(&mut outputs[self.state_index]);
        if new_state.len() != VAD_STATE_SIZE {
            return Err(HarkError::BadTensorShape {
                model: "vad",
                detail: format!(
                    "state output has {} values, expected {VAD_STATE_SIZE}",
                    new_state.len()
                ),
            });
        }
        self.state = new_state;

        outputs[self.prob_index]
            .first()
            .copied()
            .ok_or_else(|| HarkError::BadTensorShape {
                model: "vad",
                detail: "empty probability output".to_string(),
            })
    }

    fn reset(&mut self) {
        self.state.iter_mut().for_each(|v| *v = 0.0);
    }
}

//! ONNX Runtime backends via the `ort` crate.
//!
//! [`OrtSession`] is the one place sessions are built: intra-op and
//! inter-op parallelism are pinned to 1 (each pipeline stage is already
//! its own thread), and input/output tensor names are discovered from
//! the model at open time rather than hard-coded.
//!
//! ## Model I/O contracts
//!
//! | Model     | Input                | Output                          |
//! |-----------|----------------------|---------------------------------|
//! | mel       | `[1, 5120]` f32      | f32, count a multiple of 32     |
//! | embedding | `[1, 76, 32, 1]` f32 | f32, count a multiple of 96     |
//! | detector  | `[1, 16, 96]` f32    | f32 probabilities, length >= 1  |

use std::path::Path;

use ndarray::{Array2, Array3, Array4};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::info;

use crate::error::{HarkError, Result};
use crate::inference::{DetectorModel, EmbeddingModel, MelModel};
use crate::{EMB_FEATURES, EMB_WINDOW, NUM_MELS, WW_FEATURES};

pub(crate) fn session_err(e: ort::Error) -> HarkError {
    HarkError::Session(e.to_string())
}

pub(crate) fn inference_err(e: ort::Error) -> HarkError {
    HarkError::Inference(e.to_string())
}

/// Case-insensitive tensor-name lookup with a preference order.
pub(crate) fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

/// A loaded inference session with its discovered tensor names.
pub struct OrtSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OrtSession {
    /// Open a model file and discover its tensor names.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarkError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let session = SessionBuilder::new()
            .map_err(session_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(session_err)?
            .with_intra_threads(1)
            .map_err(session_err)?
            .with_inter_threads(1)
            .map_err(session_err)?
            .commit_from_file(path)
            .map_err(session_err)?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        info!(
            path = %path.display(),
            inputs = ?input_names,
            outputs = ?output_names,
            "ONNX session ready"
        );

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// One forward pass. Returns every output extracted as a flat f32
    /// vector, in the model's output order.
    pub fn run(
        &mut self,
        inputs: Vec<(String, SessionInputValue<'static>)>,
    ) -> Result<Vec<Vec<f32>>> {
        let outputs = self.session.run(inputs).map_err(inference_err)?;

        let mut extracted = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = outputs.get(name.as_str()).ok_or_else(|| {
                HarkError::Inference(format!("model output `{name}` missing from results"))
            })?;
            let (_, data) = value.try_extract_tensor::<f32>().map_err(inference_err)?;
            extracted.push(data.to_vec());
        }
        Ok(extracted)
    }

    fn first_input_name(&self, model: &'static str) -> Result<String> {
        self.input_names
            .first()
            .cloned()
            .ok_or_else(|| HarkError::Session(format!("{model} model has no inputs")))
    }
}

fn first_output(outputs: Vec<Vec<f32>>, model: &'static str) -> Result<Vec<f32>> {
    outputs
        .into_iter()
        .next()
        .ok_or_else(|| HarkError::Inference(format!("{model} model produced no outputs")))
}

// ── Mel frontend ────────────────────────────────────────────────────────────

pub struct OnnxMelModel {
    session: OrtSession,
    input_name: String,
}

impl OnnxMelModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = OrtSession::open(path)?;
        let input_name = session.first_input_name("mel")?;
        Ok(Self {
            session,
            input_name,
        })
    }
}

impl MelModel for OnnxMelModel {
    fn compute(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        let input = Array2::from_shape_vec((1, frame.len()), frame.to_vec())
            .map_err(|e| HarkError::Inference(e.to_string()))?;
        let value = Value::from_array(input).map_err(inference_err)?;

        let outputs = self.session.run(vec![(self.input_name.clone(), value.into())])?;
        let mels = first_output(outputs, "mel")?;

        if mels.is_empty() || mels.len() % NUM_MELS != 0 {
            return Err(HarkError::BadTensorShape {
                model: "mel",
                detail: format!("{} values is not a multiple of {NUM_MELS}", mels.len()),
            });
        }
        Ok(mels)
    }
}

// ── Speech embedding ────────────────────────────────────────────────────────

pub struct OnnxEmbeddingModel {
    session: OrtSession,
    input_name: String,
}

impl OnnxEmbeddingModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = OrtSession::open(path)?;
        let input_name = session.first_input_name("embedding")?;
        Ok(Self {
            session,
            input_name,
        })
    }
}

impl EmbeddingModel for OnnxEmbeddingModel {
    fn embed(&mut self, window: &[f32]) -> Result<Vec<f32>> {
        debug_assert_eq!(window.len(), EMB_WINDOW * NUM_MELS);

        let input = Array4::from_shape_vec((1, EMB_WINDOW, NUM_MELS, 1), window.to_vec())
            .map_err(|e| HarkError::Inference(e.to_string()))?;
        let value = Value::from_array(input).map_err(inference_err)?;

        let outputs = self.session.run(vec![(self.input_name.clone(), value.into())])?;
        let embedding = first_output(outputs, "embedding")?;

        if embedding.is_empty() || embedding.len() % EMB_FEATURES != 0 {
            return Err(HarkError::BadTensorShape {
                model: "embedding",
                detail: format!(
                    "{} values is not a multiple of {EMB_FEATURES}",
                    embedding.len()
                ),
            });
        }
        Ok(embedding)
    }
}

// ── Wake-word classifier ────────────────────────────────────────────────────

pub struct OnnxDetectorModel {
    session: OrtSession,
    input_name: String,
}

impl OnnxDetectorModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = OrtSession::open(path)?;
        let input_name = session.first_input_name("detector")?;
        Ok(Self {
            session,
            input_name,
        })
    }
}

impl DetectorModel for OnnxDetectorModel {
    fn classify(&mut self, window: &[f32]) -> Result<Vec<f32>> {
        debug_assert_eq!(window.len(), WW_FEATURES * EMB_FEATURES);

        let input = Array3::from_shape_vec((1, WW_FEATURES, EMB_FEATURES), window.to_vec())
            .map_err(|e| HarkError::Inference(e.to_string()))?;
        let value = Value::from_array(input).map_err(inference_err)?;

        let outputs = self.session.run(vec![(self.input_name.clone(), value.into())])?;
        let probabilities = first_output(outputs, "detector")?;

        if probabilities.is_empty() {
            return Err(HarkError::BadTensorShape {
                model: "detector",
                detail: "empty probability output".to_string(),
            });
        }
        Ok(probabilities)
    }
}

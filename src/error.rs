use thiserror::Error;

/// All errors produced by hark.
#[derive(Debug, Error)]
pub enum HarkError {
    #[error("no wake-word models provided")]
    NoWakeWordModels,

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("VAD is not initialized")]
    VadNotInitialized,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("model file not found: {}", .path.display())]
    ModelNotFound { path: std::path::PathBuf },

    #[error("inference session error: {0}")]
    Session(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("unexpected tensor shape from {model} model: {detail}")]
    BadTensorShape {
        model: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HarkError>;

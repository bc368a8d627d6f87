use thiserror::Error;
use vidqueue_core::models::media::ModelError;

/// Failures while resolving or executing a download.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The user set the cancellation flag. Never reported as an ordinary error.
    #[error("download cancelled by user")]
    Cancelled,

    #[error("insufficient disk space: need {required} bytes, available {available} bytes")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("{0} not found; install it or place it in the managed bin directory")]
    ToolMissing(String),

    #[error("{0}")]
    Process(String),

    #[error("unexpected extractor output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON from extractor: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

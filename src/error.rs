use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Insufficient data: at least {required} {unit} required, got {actual}")]
    InsufficientData {
        required: usize,
        actual: usize,
        unit: &'static str,
    },

    #[error("Scoring model is not loaded: {0}")]
    ModelUnavailable(String),

    #[error("Scoring failed: {0}")]
    ScoringFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ForecastError {
    /// Machine-readable kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            ForecastError::ModelUnavailable(_) => "MODEL_NOT_LOADED",
            ForecastError::ScoringFailure(_) => "SCORING_FAILURE",
            ForecastError::InvalidRequest(_)
            | ForecastError::DateError(_)
            | ForecastError::SerializationError(_) => "INVALID_REQUEST",
            ForecastError::InvalidConfig(_) => "INVALID_CONFIG",
            ForecastError::IoError(_) => "IO_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// The single structured error object handed back across the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }
}

impl From<ForecastError> for ErrorResponse {
    fn from(err: ForecastError) -> Self {
        err.to_response()
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

//! Error types shared across the workspace.

use thiserror::Error;

/// Main error type for feature-extraction and encoder operations.
#[derive(Error, Debug)]
pub enum AsrError {
    /// WAV decoding and resampling failures.
    #[error("Audio error: {0}")]
    Audio(String),

    /// Rejected configuration values (window sizes, strides, list lengths).
    #[error("Config error: {0}")]
    Config(String),

    /// Unknown or malformed checkpoint identifier.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Checkpoint download failures.
    #[error("Download error: {0}")]
    Download(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle tensor errors.
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias used throughout the workspace.
pub type AsrResult<T> = Result<T, AsrError>;

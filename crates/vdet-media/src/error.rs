//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
///
/// The taxonomy matters to the pipeline controller: `ModelLoad` is fatal
/// at startup, `SourceOpen`/`SinkWrite` are fatal for the job, and
/// `Detection` is recoverable per frame.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Cannot open source: {message}")]
    SourceOpen { message: String },

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Sink write failed: {message}")]
    SinkWrite { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a model load failure.
    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    /// Create a source open failure.
    pub fn source_open(message: impl Into<String>) -> Self {
        Self::SourceOpen {
            message: message.into(),
        }
    }

    /// Create a per-frame detection failure.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    /// Create a sink write failure.
    pub fn sink_write(message: impl Into<String>) -> Self {
        Self::SinkWrite {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the pipeline may degrade this frame and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MediaError::Detection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_detection_failures_are_recoverable() {
        assert!(MediaError::detection_failed("bad frame").is_recoverable());
        assert!(!MediaError::source_open("no device").is_recoverable());
        assert!(!MediaError::sink_write("disk full").is_recoverable());
        assert!(!MediaError::model_load("corrupt onnx").is_recoverable());
    }
}

//! Error types for the voice detection pipeline

use std::time::Duration;
use thiserror::Error;

/// Error type for every stage of the detection pipeline
#[derive(Debug, Error)]
pub enum VoiceError {
    /// E001: Audio bytes could not be decoded or resampled
    #[error("E001: Audio decode error - {0}")]
    Decode(String),
    /// E002: Waveform failed validation (e.g. duration out of bounds)
    #[error("E002: Audio validation error - {0}")]
    Validation(String),
    /// E003: Numeric failure inside spectral/pitch analysis
    #[error("E003: Feature extraction error - {0}")]
    FeatureExtraction(String),
    /// E004: Model inference failed
    #[error("E004: Prediction error - {0}")]
    Prediction(String),
    /// E005: Model artifact missing or unreadable
    #[error("E005: Model unavailable - {0}")]
    ModelUnavailable(String),
    /// E006: Configuration validation failed
    #[error("E006: Configuration error - {0}")]
    Config(String),
    /// E007: Pipeline exceeded the caller's deadline
    #[error("E007: Pipeline timed out after {0:?}")]
    Timeout(Duration),
    /// E008: File I/O error
    #[error("E008: I/O error - {0}")]
    Io(#[from] std::io::Error),
    /// E009: JSON (de)serialization error
    #[error("E009: Serialization error - {0}")]
    Serialization(String),
}

impl VoiceError {
    /// True for errors caused by the submitted audio rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, VoiceError::Decode(_) | VoiceError::Validation(_))
    }

    /// Stable error code (e.g. "E001")
    pub fn code(&self) -> &'static str {
        match self {
            VoiceError::Decode(_) => "E001",
            VoiceError::Validation(_) => "E002",
            VoiceError::FeatureExtraction(_) => "E003",
            VoiceError::Prediction(_) => "E004",
            VoiceError::ModelUnavailable(_) => "E005",
            VoiceError::Config(_) => "E006",
            VoiceError::Timeout(_) => "E007",
            VoiceError::Io(_) => "E008",
            VoiceError::Serialization(_) => "E009",
        }
    }
}

impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::Serialization(format!("JSON error: {}", err))
    }
}

/// Result type alias for voice detection operations
pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(VoiceError::Decode("bad".into()).is_client_error());
        assert!(VoiceError::Validation("short".into()).is_client_error());
        assert!(!VoiceError::FeatureExtraction("nan".into()).is_client_error());
        assert!(!VoiceError::Prediction("dims".into()).is_client_error());
    }

    #[test]
    fn test_display_carries_code() {
        let err = VoiceError::Validation("Audio too short: 0.30s".into());
        assert_eq!(err.code(), "E002");
        assert!(err.to_string().starts_with("E002"));
    }
}

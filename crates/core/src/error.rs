//! Error types for the image-cropper-core library.
//!
//! This module provides granular error variants for the failure modes of
//! the crop pipeline. Not every variant is meant for the user: see
//! [`AppError::is_user_visible`].

use thiserror::Error;

/// Errors that can occur within the image-cropper-core library.
///
/// None of these are fatal. Each one leaves the session in a safe prior
/// state so the next event can proceed normally.
#[derive(Error, Debug)]
pub enum AppError {
    /// The uploaded file is not one of the accepted raster kinds.
    #[error("{0}")]
    InvalidFileType(String),

    /// Geometry was requested before the display dimensions were known.
    #[error("Image dimensions are not known yet")]
    NotReady,

    /// The crop rectangle has zero width or height.
    #[error("Selection is incomplete (zero width or height)")]
    IncompleteSelection,

    /// The raster backend could not produce output bytes.
    #[error("Failed to render cropped image: {0}")]
    EncodingFailure(String),

    /// The external face detector failed to load, errored or timed out.
    #[error("Face detection unavailable: {0}")]
    DetectionUnavailable(String),

    /// A target aspect ratio that is not a positive finite number.
    #[error("Invalid aspect ratio: {0}")]
    InvalidAspect(f64),

    /// The uploaded bytes could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// A download was requested before any crop was committed.
    #[error("No cropped image is available yet")]
    NoArtifact,

    /// Configuration-related errors (invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an encoding failure with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailure(msg.into())
    }

    /// Creates a detection failure with the given message.
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::DetectionUnavailable(msg.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether the error should be shown to the user.
    ///
    /// `NotReady`, `IncompleteSelection` and `DetectionUnavailable` are
    /// handled silently by the session; everything else is surfaced.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Self::NotReady | Self::IncompleteSelection | Self::DetectionUnavailable(_)
        )
    }

    /// Whether retrying the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EncodingFailure(_) | Self::NotReady | Self::DetectionUnavailable(_)
        )
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_errors_are_not_user_visible() {
        assert!(!AppError::NotReady.is_user_visible());
        assert!(!AppError::IncompleteSelection.is_user_visible());
        assert!(!AppError::detection("timeout").is_user_visible());
        assert!(AppError::encoding("empty canvas").is_user_visible());
        assert!(AppError::InvalidFileType("nope".into()).is_user_visible());
    }

    #[test]
    fn encoding_failure_is_retryable() {
        assert!(AppError::encoding("boom").is_retryable());
        assert!(!AppError::InvalidFileType("nope".into()).is_retryable());
    }

    #[test]
    fn invalid_file_type_displays_message_verbatim() {
        let err = AppError::InvalidFileType("Only JPG and PNG files are allowed!".into());
        assert_eq!(err.to_string(), "Only JPG and PNG files are allowed!");
    }
}

//! Error types for gammalss.

use ndarray::ShapeError;
use thiserror::Error;

/// Result type alias for gammalss operations.
pub type Result<T> = std::result::Result<T, LssError>;

/// Errors that can occur while configuring or evaluating a distribution.
#[derive(Error, Debug)]
pub enum LssError {
    /// Invalid parameter value.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),
    /// Shape mismatch in arrays.
    #[error("Shape mismatch: expected {expected_shape}, got {actual_shape}")]
    ShapeMismatch {
        expected_shape: String,
        actual_shape: String,
    },
    /// A serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// A generic error from the argmin crate.
    #[error("Argmin error: {0}")]
    ArgminError(String),
}

impl From<argmin::core::Error> for LssError {
    fn from(err: argmin::core::Error) -> Self {
        LssError::ArgminError(err.to_string())
    }
}

impl From<ShapeError> for LssError {
    fn from(err: ShapeError) -> Self {
        LssError::ShapeMismatch {
            expected_shape: "unknown".to_string(),
            actual_shape: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LssError {
    fn from(err: serde_json::Error) -> Self {
        LssError::SerializationError(err.to_string())
    }
}

//! Error types for the Sheaf library.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type is
//! [`SheafError`]. The variants follow the pipeline stages so that the binary can
//! report which stage aborted the run.
//!
//! # Examples
//!
//! ```
//! use sheaf::error::{Result, SheafError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(SheafError::invalid_argument("shard count must be positive"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Sheaf operations.
#[derive(Error, Debug)]
pub enum SheafError {
    /// I/O errors (file operations, directory bookkeeping, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing or malformed parameters, unknown identifiers.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset loading errors (missing splits, malformed records).
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Encoder or model loading errors.
    #[error("Model error: {0}")]
    Model(String),

    /// Feature extraction errors (failed encoder call, inconsistent widths).
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Feature cache errors.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Classifier fitting or fine-tuning errors.
    #[error("Training error: {0}")]
    Training(String),

    /// Evaluation errors (shape mismatch between predictions and labels).
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with SheafError.
pub type Result<T> = std::result::Result<T, SheafError>;

impl SheafError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SheafError::Config(msg.into())
    }

    /// Create a new dataset error.
    pub fn dataset<S: Into<String>>(msg: S) -> Self {
        SheafError::Dataset(msg.into())
    }

    /// Create a new model error.
    pub fn model<S: Into<String>>(msg: S) -> Self {
        SheafError::Model(msg.into())
    }

    /// Create a new extraction error.
    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        SheafError::Extraction(msg.into())
    }

    /// Create a new cache error.
    pub fn cache<S: Into<String>>(msg: S) -> Self {
        SheafError::Cache(msg.into())
    }

    /// Create a new training error.
    pub fn training<S: Into<String>>(msg: S) -> Self {
        SheafError::Training(msg.into())
    }

    /// Create a new evaluation error.
    pub fn evaluation<S: Into<String>>(msg: S) -> Self {
        SheafError::Evaluation(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SheafError::InvalidArgument(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        SheafError::Serialization(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SheafError::Other(msg.into())
    }
}

impl From<bincode::Error> for SheafError {
    fn from(err: bincode::Error) -> Self {
        SheafError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SheafError {
    fn from(err: anyhow::Error) -> Self {
        SheafError::Other(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SheafError::config("missing model_id");
        assert_eq!(error.to_string(), "Configuration error: missing model_id");

        let error = SheafError::extraction("shard 3 failed");
        assert_eq!(error.to_string(), "Extraction error: shard 3 failed");

        let error = SheafError::evaluation("2 rows vs 3 labels");
        assert_eq!(error.to_string(), "Evaluation error: 2 rows vs 3 labels");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let sheaf_error = SheafError::from(io_error);

        match sheaf_error {
            SheafError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err = anyhow::anyhow!("inner").context("outer");
        let sheaf_error = SheafError::from(err);
        assert_eq!(sheaf_error.to_string(), "Error: outer: inner");
    }
}

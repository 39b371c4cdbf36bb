//! Error types for index construction, persistence and search

use std::path::PathBuf;

use thiserror::Error;

use crate::datatype::DataType;

/// Result type alias for nnsearch operations
pub type Result<T> = std::result::Result<T, NnError>;

/// Error types that can occur while building, persisting or querying an index
#[derive(Error, Debug)]
pub enum NnError {
    #[error("Cannot open file {}: {source}", path.display())]
    CannotOpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Datatype of saved index ({found}) differs from the one being loaded ({expected})")]
    IncompatibleIndex { expected: DataType, found: DataType },

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid index file: {0}")]
    InvalidFormat(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Point not found: {id}")]
    PointNotFound { id: usize },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl NnError {
    pub(crate) fn invalid_param(name: &str, reason: impl Into<String>) -> Self {
        NnError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

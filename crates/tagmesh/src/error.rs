//! Importer errors.

use tagmesh_decode::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tag '{0}' not found")]
    TagNotFound(String),

    #[error("field '{field}' not found in tag '{tag}'")]
    FieldNotFound { tag: String, field: String },

    #[error("field '{field}' is not {expected}")]
    FieldType { field: String, expected: &'static str },

    #[error("tag backend is not initialized")]
    BackendNotInitialized,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for importer operations.
pub type Result<T> = std::result::Result<T, Error>;

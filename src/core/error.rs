//! Error types for the ensemble engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SVMError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Kernel mismatch: ensemble uses {expected}, model uses {actual}")]
    KernelMismatch { expected: String, actual: String },

    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Ensemble contains no models")]
    EmptyEnsemble,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, SVMError>;

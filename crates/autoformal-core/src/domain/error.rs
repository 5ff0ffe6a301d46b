//! Domain-level error taxonomy for the formalization engine.

use crate::domain::artifact::ArtifactField;
use crate::services::ServiceError;

/// Errors produced while extracting a function signature from solved source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no function definition found in source")]
    NoFunction,

    #[error("function {name} not found in source")]
    FunctionNotFound { name: String },

    #[error("malformed parameter list: {detail}")]
    MalformedParameters { detail: String },

    #[error("signature field must not be empty: {field}")]
    EmptyField { field: String },
}

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum FormalizeError {
    #[error("malformed work item {item_id}: {reason}")]
    MalformedItem { item_id: String, reason: String },

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("field {0} is sealed after translation")]
    SealedField(ArtifactField),

    #[error("service fault: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("record for {requested} holds item {found}")]
    RecordMismatch { requested: String, found: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, FormalizeError>;

//! Error types for the service backends

use autoformal_core::{ServiceError, ServiceKind};
use thiserror::Error;

/// Errors raised while talking to the Lean toolchain or a model endpoint
#[derive(Error, Debug)]
pub enum BackendError {
    /// No compiler program configured
    #[error("compiler command is empty")]
    EmptyCommand,

    /// Compiler process could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Compiler did not finish in time
    #[error("compiler timed out after {0}s")]
    Timeout(u64),

    /// API key variable unset
    #[error("API key variable {0} is not set")]
    MissingApiKey(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Network or protocol failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Reply could not be read as the requested fields
    #[error("malformed model reply: {0}")]
    MalformedReply(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err.to_string())
    }
}

impl BackendError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout(_) | BackendError::Http(_) | BackendError::MalformedReply(_) => {
                true
            }
            BackendError::Status { status, .. } => is_retryable_status(*status),
            BackendError::EmptyCommand
            | BackendError::Spawn { .. }
            | BackendError::MissingApiKey(_)
            | BackendError::Io(_) => false,
        }
    }

    pub fn into_service_error(self, service: ServiceKind) -> ServiceError {
        if self.is_transient() {
            ServiceError::transient(service, self.to_string())
        } else {
            ServiceError::fatal(service, self.to_string())
        }
    }
}

/// 408, 429 and every 5xx are worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

pub type Result<T> = std::result::Result<T, BackendError>;

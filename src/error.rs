//! Error types for the reconciler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Failure reported by the management API. The message is kept verbatim
    /// because callers (and the deletion controller) read it.
    #[error("{message}")]
    Store { status: u16, message: String },

    /// HTTP request to the management API failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Manifest could not be parsed
    #[error("Manifest error: {0}")]
    ManifestError(#[from] serde_yaml::Error),

    /// Node deletion kept hitting reference conflicts after the remediation cap
    #[error(
        "giving up deleting node {node} after {attempts} remediation round(s); \
         still referenced by pool {pool}: {last_error}"
    )]
    DeletionExhausted {
        node: String,
        pool: String,
        attempts: u32,
        last_error: String,
    },
}

impl Error {
    pub fn store(status: u16, message: impl Into<String>) -> Self {
        Error::Store {
            status,
            message: message.into(),
        }
    }

    /// True when the store reported the addressed resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store { status: 404, .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

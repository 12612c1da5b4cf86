//! Error types for wgdesk

use thiserror::Error;

/// Result type alias using wgdesk Error
pub type Result<T> = std::result::Result<T, Error>;

/// wgdesk error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Address pool {range} is exhausted")]
    CapacityExhausted { range: String },

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Command `{command}` failed: {message}")]
    ExternalCommand { command: String, message: String },

    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl Error {
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    /// HTTP-equivalent status class for API layers sitting on top of the registry
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound { .. } => 404,
            Error::CapacityExhausted { .. } => 409,
            _ => 500,
        }
    }

    /// Whether this error came from malformed caller input
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

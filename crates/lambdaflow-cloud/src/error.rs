//! Provisioning error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while provisioning a function and its satellites
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The remote resource does not exist.
    ///
    /// Read paths turn this into `None`; it is only surfaced where presence
    /// is mandatory (an explicitly named role).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The execution role exists but Lambda cannot assume it yet.
    #[error("Role cannot be assumed by Lambda yet: {0}")]
    RolePropagation(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProvisionError>,
    },

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to read source archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionError {
    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the bounded retry policy may try the call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RolePropagation(_))
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

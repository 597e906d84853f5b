//! # Confstate Core Kernel Errors
//!
//! Defines the crate-wide [`Error`] type. Subsystems define their own typed
//! errors (see [`StorageSystemError`]) which convert into it with `?`.
use std::path::PathBuf;
use std::result::Result as StdResult;

use crate::storage::error::StorageSystemError;
use thiserror::Error as ThisError;

/// Custom error type for the confstate core
#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Settings could not be loaded or were invalid
    #[error("Settings error for '{}': {message}", path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<inline>".into()))]
    Settings {
        path: Option<PathBuf>,
        message: String,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    /// Wrap an I/O error with the operation and path it happened on.
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::io(source, operation, path))
    }

    /// Borrow the storage error inside, if this is one.
    pub fn as_storage(&self) -> Option<&StorageSystemError> {
        match self {
            Error::StorageSystem(e) => Some(e),
            _ => None,
        }
    }
}

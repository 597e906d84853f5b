//! # Confstate Core Storage System Errors
//!
//! Defines error types specific to the storage manager.
//!
//! [`StorageSystemError`] covers file I/O and (de)serialization of storage
//! documents, macro resolution, cache-key computation, storage construction,
//! stream provider failures and change-tracker deregistration.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageSystemError {
    #[error("I/O error during operation '{operation}' on path '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization to '{format}' failed: {source}")]
    SerializationError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Deserialization from '{format}' failed: {source}")]
    DeserializationError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Unsupported configuration format: {0}")]
    UnsupportedConfigFormat(String),

    #[error("Cannot resolve '{spec}' in macro table [{table}]")]
    UnresolvedMacro { spec: String, table: String },

    #[error("Macro cycle detected while expanding '{spec}': {}", chain.join(" -> "))]
    MacroCycle { spec: String, chain: Vec<String> },

    #[error("Invalid macro key '{key}': {reason}")]
    InvalidMacro { key: String, reason: String },

    #[error("Normalized spec is empty, raw spec '{raw}'")]
    EmptySpec { raw: String },

    #[error("Extension is missing for storage file: {0}")]
    MissingExtension(PathBuf),

    #[error("Cannot construct storage of class '{class}': {reason}")]
    StorageConstructionFailure { class: String, reason: String },

    #[error("Custom storage class '{0}' is already registered")]
    CustomStorageAlreadyRegistered(String),

    #[error("Stream provider '{provider}' failed during '{operation}' for '{spec}': {message}")]
    StreamProvider {
        provider: String,
        operation: String,
        spec: String,
        message: String,
    },

    #[error("{} stream provider(s) failed: {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    ProviderFailures(Vec<StorageSystemError>),

    #[error("Failed to deregister {} storage(s) from the change tracker: {}", failures.len(), failures.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    DeregistrationFailed { failures: Vec<StorageSystemError> },

    #[error("No storage cached for spec '{0}'")]
    StorageNotFound(String),

    #[error("Storage '{storage}' failed during '{operation}': {message}")]
    OperationFailed {
        storage: String,
        operation: String,
        message: String,
    },

    #[error("Invalid path provided: '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

// Helper for creating Io errors, ensuring path is always included.
impl StorageSystemError {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        }
    }

    /// Error raised by a single stream provider.
    pub fn provider(
        provider: impl Into<String>,
        operation: impl Into<String>,
        spec: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StorageSystemError::StreamProvider {
            provider: provider.into(),
            operation: operation.into(),
            spec: spec.into(),
            message: message.into(),
        }
    }
}

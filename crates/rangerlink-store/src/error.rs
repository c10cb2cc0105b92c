//! Error types for the persistence layer.
//!
//! All errors are propagated via [`StoreError`], which wraps the underlying
//! [`fred`], [`serde_json`] and I/O errors with the key or path involved.

use std::path::PathBuf;

/// Errors that can occur while loading or saving snapshots.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a snapshot file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The stored snapshot was written by a newer client.
    #[error("snapshot for {key} has version {found}, newest supported is {supported}")]
    UnsupportedVersion {
        /// Storage key.
        key: String,
        /// Version found in the store.
        found: u32,
        /// Newest version this build reads.
        supported: u32,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

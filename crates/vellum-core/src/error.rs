//! Error types for Vellum core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; embedding applications map
//! these to user-facing messages.
//!
//! Sync conflicts are intentionally absent: divergent edits are surfaced
//! as data (`SyncOutcome::conflicts`), never as errors.

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StoreError;

/// Result type alias for Vellum operations.
pub type Result<T> = std::result::Result<T, VellumError>;

/// Core error type for Vellum operations.
#[derive(Debug, Error)]
pub enum VellumError {
    /// The credential vault is not unlocked (or not set up)
    #[error("Credential vault is not ready: {0}")]
    NotReady(String),

    /// Encryption credentials already exist; `clear` is the only way back
    #[error("Encryption credentials are already initialized")]
    AlreadyInitialized,

    /// Password or token rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Ciphertext tampered with, corrupted, or missing
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Note not found by ID
    #[error("Note not found: {0}")]
    NoteNotFound(Uuid),

    /// Collaborator store error (metadata, blob, or auth backend)
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: StoreError,
    },

    /// Encryption or key derivation error
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation aborted by a cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Generic error (fallback)
    #[error("{0}")]
    Other(String),
}

//! Collaborator trait definitions.
//!
//! The core never talks to a database or object store directly; it goes
//! through these traits. Implementations are expected to be thin
//! transports (HTTP clients, SDK wrappers). The in-memory reference
//! implementations in `storage::memory` back the test suite and local
//! development.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::notes::types::{NoteRecord, RecordPatch};

/// Errors reported by collaborator stores.
///
/// The split between `Unavailable` and the permanent variants drives the
/// retry policy: only `Unavailable` (timeouts, 5xx-class failures) is
/// worth retrying; everything else surfaces immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record or blob not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected by the backend (401/403-class)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transient backend failure (timeout, connection reset, 5xx)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Write conflicted with existing state (duplicate id, lost race)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Permanent backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a retry with backoff could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A verified caller identity supplied per request.
///
/// The core trusts only `user_id` for scoping; the access token rides
/// along for transport implementations that attach it to outgoing calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    /// Verified user id; all reads and writes are scoped to it
    pub user_id: Uuid,

    /// Bearer token for the backing services
    pub access_token: String,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Source of verified identities.
///
/// Implementations wrap the session/auth layer of the host application.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current verified principal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` when there is no valid session.
    async fn principal(&self) -> Result<Principal, StoreError>;
}

/// Note metadata store.
///
/// Holds `NoteRecord`s only: titles are placeholders and content lives in
/// the blob store, so a compromised metadata backend learns structure,
/// never plaintext.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Get a record by note id.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(record))` if found, `Ok(None)` if not found.
    async fn get(&self, id: Uuid) -> Result<Option<NoteRecord>, StoreError>;

    /// List all records for a user, ordered by `created_at` ascending.
    async fn list(&self, user_id: Uuid) -> Result<Vec<NoteRecord>, StoreError>;

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a record with the same id exists.
    async fn insert(&self, record: NoteRecord) -> Result<(), StoreError>;

    /// Apply a partial update and return the patched record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record has this id.
    async fn update(&self, id: Uuid, patch: RecordPatch) -> Result<NoteRecord, StoreError>;

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record has this id.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Ciphertext blob store.
///
/// Paths are opaque strings; the repository namespaces them by user id
/// (`{user_id}/notes/{note_id}/{revision}.bin`) so boundary access checks
/// can key off the prefix.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob, returning the path it is addressable under.
    ///
    /// Implementations may canonicalize the path; callers must persist the
    /// returned value, not the input.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError>;

    /// Fetch a blob.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Delete a blob.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if nothing is stored at `path`.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

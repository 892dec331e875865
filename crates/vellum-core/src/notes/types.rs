//! Core data types for the notes layer.
//!
//! `NoteRecord` is what collaborator stores and the sync protocol see:
//! placeholder title, blob pointer, nonce, digests, counters. `Note` is
//! the decrypted view handed back to callers. The two never mix: real
//! titles and content exist only inside the encrypted blob payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::EncryptionVersion;

/// Placeholder stored in the metadata `title` column.
///
/// The real title is sealed inside the blob alongside the content, so
/// every record carries this fixed marker instead.
pub const REDACTED_TITLE: &str = "(encrypted)";

/// Note metadata record as stored and synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    /// Unique identifier for this note
    pub id: Uuid,

    /// Owning user; all queries are scoped to it
    pub user_id: Uuid,

    /// Opaque placeholder (`REDACTED_TITLE`); never the real title
    pub title: String,

    /// Blob store path of the current ciphertext revision
    pub storage_path: String,

    /// Base64 nonce for the current revision (wire name `iv`)
    #[serde(rename = "iv")]
    pub nonce: String,

    /// Plaintext labels; not covered by encryption
    pub tags: Vec<String>,

    /// Archived flag
    pub is_archived: bool,

    /// Favorite flag
    pub is_favorite: bool,

    /// Encryption suite this revision was written with
    pub encryption_version: EncryptionVersion,

    /// Hex SHA-256 of the decrypted content
    pub content_hash: String,

    /// Device that performed the last write
    pub device_id: Uuid,

    /// Starts at 1; strictly increases on every blob-rewriting update
    pub sync_version: u64,

    /// When this note was created
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// The document sealed inside a note's blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePlaintext {
    /// Real note title
    pub title: String,

    /// Note body
    pub content: String,
}

/// Decrypted note as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for this note
    pub id: Uuid,

    /// Decrypted title
    pub title: String,

    /// Decrypted body
    pub content: String,

    /// Plaintext labels
    pub tags: Vec<String>,

    /// Archived flag
    pub is_archived: bool,

    /// Favorite flag
    pub is_favorite: bool,

    /// Version counter from the metadata record
    pub sync_version: u64,

    /// When this note was created
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Builder for creating new notes.
#[derive(Debug, Clone)]
pub struct NewNote {
    /// Note title (will be encrypted)
    pub title: String,

    /// Note body (will be encrypted)
    pub content: String,

    /// Plaintext labels
    pub tags: Vec<String>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Partial update to a note.
///
/// Title and content changes rewrite the encrypted blob and bump
/// `sync_version`; tag and flag changes touch metadata only.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    /// New title (rewrites the blob)
    pub title: Option<String>,

    /// New body (rewrites the blob, refreshes `content_hash`)
    pub content: Option<String>,

    /// Replace the tag list
    pub tags: Option<Vec<String>>,

    /// Set the archived flag
    pub is_archived: Option<bool>,

    /// Set the favorite flag
    pub is_favorite: Option<bool>,
}

impl NoteUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.is_archived = Some(archived);
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.is_favorite = Some(favorite);
        self
    }

    /// Whether this update touches the encrypted payload.
    pub fn rewrites_blob(&self) -> bool {
        self.title.is_some() || self.content.is_some()
    }

    /// Whether this update changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.is_archived.is_none()
            && self.is_favorite.is_none()
    }
}

/// Partial update to a metadata record, applied by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    /// New blob path (revision change)
    pub storage_path: Option<String>,

    /// New base64 nonce (wire name `iv`)
    #[serde(rename = "iv")]
    pub nonce: Option<String>,

    /// Replace the tag list
    pub tags: Option<Vec<String>>,

    /// Set the archived flag
    pub is_archived: Option<bool>,

    /// Set the favorite flag
    pub is_favorite: Option<bool>,

    /// New content digest
    pub content_hash: Option<String>,

    /// Writing device
    pub device_id: Option<Uuid>,

    /// New version counter value
    pub sync_version: Option<u64>,

    /// New modification timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// Apply this patch to a record in place.
    pub fn apply_to(&self, record: &mut NoteRecord) {
        if let Some(storage_path) = &self.storage_path {
            record.storage_path = storage_path.clone();
        }
        if let Some(nonce) = &self.nonce {
            record.nonce = nonce.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(is_archived) = self.is_archived {
            record.is_archived = is_archived;
        }
        if let Some(is_favorite) = self.is_favorite {
            record.is_favorite = is_favorite;
        }
        if let Some(content_hash) = &self.content_hash {
            record.content_hash = content_hash.clone();
        }
        if let Some(device_id) = self.device_id {
            record.device_id = device_id;
        }
        if let Some(sync_version) = self.sync_version {
            record.sync_version = sync_version;
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
    }
}

/// One note that failed inside a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFailure {
    /// The note that failed
    pub note_id: Uuid,

    /// Human-readable failure reason
    pub reason: String,
}

/// Result of a batch read: every decryptable note, plus per-note failures.
///
/// A corrupted or unreachable note never aborts the batch; it lands in
/// `failures` and the rest load normally.
#[derive(Debug, Clone, Default)]
pub struct NoteBatch {
    /// Successfully decrypted notes, ordered by `created_at`
    pub notes: Vec<Note>,

    /// Notes that could not be loaded, with reasons
    pub failures: Vec<NoteFailure>,
}

/// Outcome of a bulk password rotation.
#[derive(Debug, Clone, Default)]
pub struct PasswordChangeReport {
    /// Notes now encrypted under the new key
    pub rotated: Vec<Uuid>,

    /// Notes that could not be rotated, with reasons
    pub failures: Vec<NoteFailure>,

    /// Whether the new password was committed to the vault.
    ///
    /// False means the old password is still the active one and the
    /// rotation should be re-run with the same pair after fixing the
    /// failures below.
    pub committed: bool,
}

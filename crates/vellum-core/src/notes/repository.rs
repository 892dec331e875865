//! Encrypted note repository.
//!
//! Orchestrates the vault, the collaborator stores, and the crypto layer
//! into note CRUD. Plaintext exists only inside this module's call
//! frames: everything that crosses a collaborator trait is ciphertext,
//! placeholder titles, or digests.
//!
//! ## Write ordering
//!
//! - Create uploads the blob, then inserts metadata. A metadata failure
//!   triggers a best-effort delete of the uploaded blob; a crash in the
//!   window leaves an unreferenced blob, never a dangling record.
//! - Update uploads the new revision, then patches metadata, then deletes
//!   the superseded blob best-effort. The record always points at a blob
//!   that exists.
//! - Delete removes the blob, then the record. A crash in the window
//!   leaves a record whose reads fail per-note; stale plaintext can never
//!   resurface.
//!
//! ## Concurrency
//!
//! Operations on one note id serialize on a per-id async lock; distinct
//! ids proceed concurrently. Batch reads and password rotation fan out
//! over a semaphore-bounded worker pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::crypto::{content_hash, decode_nonce, decrypt, encrypt, DerivedKey};
use crate::error::{Result, VellumError};
use crate::storage::{
    with_retry, AuthProvider, BlobStore, MetadataStore, Principal, RetryPolicy, StoreError,
};
use crate::vault::CredentialVault;

use super::types::{
    NewNote, Note, NoteBatch, NoteFailure, NotePlaintext, NoteRecord, NoteUpdate,
    PasswordChangeReport, RecordPatch, REDACTED_TITLE,
};

/// Tuning knobs for the repository.
#[derive(Debug, Clone, Copy)]
pub struct RepositoryConfig {
    /// Worker pool size for batch reads and password rotation (minimum 1)
    pub max_concurrency: usize,

    /// Retry policy applied to every collaborator call
    pub retry: RetryPolicy,
}

impl RepositoryConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Encrypted CRUD over the metadata and blob collaborators.
///
/// Every operation requires an unlocked vault and scopes itself to the
/// authenticated user. Construct once per session and share behind an
/// `Arc`.
pub struct NoteRepository {
    vault: Arc<CredentialVault>,
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    auth: Arc<dyn AuthProvider>,
    config: RepositoryConfig,
    note_locks: StdMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl NoteRepository {
    pub fn new(
        vault: Arc<CredentialVault>,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            vault,
            metadata,
            blobs,
            auth,
            config: RepositoryConfig::default(),
            note_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a note.
    ///
    /// Title and content are sealed together into one blob; the metadata
    /// record carries only the placeholder title, the blob pointer, and
    /// the content digest. `sync_version` starts at 1.
    pub async fn create_note(&self, new_note: NewNote) -> Result<Note> {
        let key = self.vault.active_key().await?;
        let principal = self.principal().await?;
        let device_id = self.vault.device_id().await?;
        let version = self.vault.encryption_version().await?;

        let payload = NotePlaintext {
            title: new_note.title,
            content: new_note.content,
        };
        let plaintext = serde_json::to_vec(&payload)?;
        let sealed = encrypt(&plaintext, &key)?;

        let id = Uuid::new_v4();
        let path = blob_path(principal.user_id, id);
        let stored_path = with_retry(self.config.retry, "blob.put", || {
            self.blobs.put(&path, sealed.ciphertext.clone())
        })
        .await?;

        let now = Utc::now();
        let record = NoteRecord {
            id,
            user_id: principal.user_id,
            title: REDACTED_TITLE.to_string(),
            storage_path: stored_path.clone(),
            nonce: sealed.nonce_base64(),
            tags: new_note.tags,
            is_archived: false,
            is_favorite: false,
            encryption_version: version,
            content_hash: content_hash(&payload.content),
            device_id,
            sync_version: 1,
            created_at: now,
            updated_at: now,
        };

        let insert = with_retry(self.config.retry, "metadata.insert", || {
            self.metadata.insert(record.clone())
        })
        .await;
        if let Err(err) = insert {
            // The blob is unreferenced; remove it so it cannot leak.
            if let Err(cleanup) = self.blobs.delete(&stored_path).await {
                warn!(note_id = %id, error = %cleanup, "Orphaned blob cleanup failed");
            }
            return Err(err.into());
        }

        info!(note_id = %id, "Note created");
        Ok(note_view(&record, payload))
    }

    /// Fetch and decrypt a single note.
    ///
    /// # Errors
    ///
    /// - `VellumError::NoteNotFound` if the id does not exist for this user
    /// - `VellumError::Integrity` if the blob fails authentication
    pub async fn get_note(&self, id: Uuid) -> Result<Note> {
        let key = self.vault.active_key().await?;
        let principal = self.principal().await?;

        let record = self.fetch_owned_record(id, principal.user_id).await?;
        load_note(record, &self.blobs, &key, self.config.retry).await
    }

    /// Fetch and decrypt every note for the current user.
    ///
    /// Notes come back ordered by `created_at` ascending. A note that
    /// cannot be loaded (missing blob, failed authentication, store error)
    /// is logged and reported in `NoteBatch::failures`; it never aborts
    /// the rest of the batch.
    pub async fn get_all_notes(&self) -> Result<NoteBatch> {
        let key = self.vault.active_key().await?;
        let principal = self.principal().await?;

        let records = with_retry(self.config.retry, "metadata.list", || {
            self.metadata.list(principal.user_id)
        })
        .await?;
        debug!(count = records.len(), "Loading note batch");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut handles = Vec::with_capacity(records.len());

        for record in records {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| VellumError::Other("Worker pool closed".to_string()))?;
            let blobs = self.blobs.clone();
            let key = key.clone();
            let retry = self.config.retry;
            let id = record.id;

            handles.push((
                id,
                tokio::spawn(async move {
                    let _permit = permit;
                    load_note(record, &blobs, &key, retry).await
                }),
            ));
        }

        let mut batch = NoteBatch::default();
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(note)) => batch.notes.push(note),
                Ok(Err(err)) => {
                    warn!(note_id = %id, error = %err, "Skipping unreadable note");
                    batch.failures.push(NoteFailure {
                        note_id: id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(note_id = %id, error = %err, "Note load task failed");
                    batch.failures.push(NoteFailure {
                        note_id: id,
                        reason: format!("Task failed: {}", err),
                    });
                }
            }
        }
        Ok(batch)
    }

    /// Apply a partial update to a note.
    ///
    /// Title or content changes decrypt the current blob, merge, and
    /// re-encrypt to a new revision path with a fresh nonce, bumping
    /// `sync_version`. Tag and flag changes patch metadata only and leave
    /// `sync_version` alone. An empty update returns the current note
    /// without writing anything.
    pub async fn update_note(&self, id: Uuid, update: NoteUpdate) -> Result<Note> {
        let key = self.vault.active_key().await?;
        let principal = self.principal().await?;
        let device_id = self.vault.device_id().await?;

        let lock = self.note_lock(id);
        let _guard = lock.lock().await;

        let record = self.fetch_owned_record(id, principal.user_id).await?;

        if update.is_empty() {
            return load_note(record, &self.blobs, &key, self.config.retry).await;
        }

        if !update.rewrites_blob() {
            let patch = RecordPatch {
                tags: update.tags,
                is_archived: update.is_archived,
                is_favorite: update.is_favorite,
                device_id: Some(device_id),
                updated_at: Some(Utc::now()),
                ..Default::default()
            };
            let updated = with_retry(self.config.retry, "metadata.update", || {
                self.metadata.update(id, patch.clone())
            })
            .await?;
            debug!(note_id = %id, "Note metadata updated");
            return load_note(updated, &self.blobs, &key, self.config.retry).await;
        }

        // Blob rewrite: merge the patch into the current plaintext.
        record.encryption_version.ensure_supported()?;
        let bytes = with_retry(self.config.retry, "blob.get", || {
            self.blobs.get(&record.storage_path)
        })
        .await?;
        let nonce = decode_nonce(&record.nonce)?;
        let current = decrypt(&bytes, &nonce, &key)?;
        let mut payload: NotePlaintext = serde_json::from_slice(&current)?;

        if let Some(title) = update.title {
            payload.title = title;
        }
        if let Some(content) = update.content {
            payload.content = content;
        }

        let plaintext = serde_json::to_vec(&payload)?;
        let sealed = encrypt(&plaintext, &key)?;
        let new_path = blob_path(principal.user_id, id);
        let stored_path = with_retry(self.config.retry, "blob.put", || {
            self.blobs.put(&new_path, sealed.ciphertext.clone())
        })
        .await?;

        let patch = RecordPatch {
            storage_path: Some(stored_path.clone()),
            nonce: Some(sealed.nonce_base64()),
            tags: update.tags,
            is_archived: update.is_archived,
            is_favorite: update.is_favorite,
            content_hash: Some(content_hash(&payload.content)),
            device_id: Some(device_id),
            sync_version: Some(record.sync_version + 1),
            updated_at: Some(Utc::now()),
        };
        let updated = match with_retry(self.config.retry, "metadata.update", || {
            self.metadata.update(id, patch.clone())
        })
        .await
        {
            Ok(updated) => updated,
            Err(err) => {
                // The new revision never became current; remove it.
                if let Err(cleanup) = self.blobs.delete(&stored_path).await {
                    warn!(note_id = %id, error = %cleanup, "Orphaned blob cleanup failed");
                }
                return Err(err.into());
            }
        };

        self.delete_superseded_blob(id, &record.storage_path, &updated.storage_path)
            .await;

        info!(note_id = %id, sync_version = updated.sync_version, "Note content updated");
        Ok(note_view(&updated, payload))
    }

    /// Delete a note: blob first, then the metadata record.
    ///
    /// A `NotFound` from either store is treated as already done, so
    /// retrying a partially applied delete converges.
    pub async fn delete_note(&self, id: Uuid) -> Result<()> {
        self.ensure_unlocked().await?;
        let principal = self.principal().await?;

        let lock = self.note_lock(id);
        let _guard = lock.lock().await;

        let record = self.fetch_owned_record(id, principal.user_id).await?;

        match with_retry(self.config.retry, "blob.delete", || {
            self.blobs.delete(&record.storage_path)
        })
        .await
        {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        match with_retry(self.config.retry, "metadata.delete", || {
            self.metadata.delete(id)
        })
        .await
        {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        info!(note_id = %id, "Note deleted");
        Ok(())
    }

    /// Change the encryption password, re-encrypting every note.
    ///
    /// Runs the vault's two-phase rotation: verify the current password,
    /// re-encrypt all note blobs under the new key with bounded
    /// concurrency, and commit the new verifier only when every note
    /// rotated. On any per-note failure or on cancellation the current
    /// password stays active (`committed: false`) and the run is
    /// resumable: re-running with the same pair skips notes that already
    /// decrypt under the new key.
    ///
    /// The token is honored between notes, never mid-note; notes already
    /// in flight complete.
    ///
    /// # Errors
    ///
    /// - `VellumError::Authentication` if `current` is wrong
    /// - `VellumError::InvalidInput` if `new` fails validation
    /// - `VellumError::Cancelled` if the token is already cancelled on entry
    pub async fn change_password(
        &self,
        current: &str,
        new: &str,
        cancel: &CancelToken,
    ) -> Result<PasswordChangeReport> {
        if cancel.is_cancelled() {
            return Err(VellumError::Cancelled);
        }

        let principal = self.principal().await?;
        let device_id = self.vault.device_id().await?;

        let rotation = self.vault.begin_password_change(current, new).await?;

        let records = with_retry(self.config.retry, "metadata.list", || {
            self.metadata.list(principal.user_id)
        })
        .await?;
        info!(notes = records.len(), "Starting password rotation");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut handles = Vec::with_capacity(records.len());
        let mut cancelled = false;

        for record in records {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| VellumError::Other("Worker pool closed".to_string()))?;
            // Checked after capacity opens up, so a cancellation that
            // lands while units are in flight stops the very next one
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let metadata = self.metadata.clone();
            let blobs = self.blobs.clone();
            let old_key = rotation.current_key().clone();
            let new_key = rotation.new_key().clone();
            let retry = self.config.retry;
            let lock = self.note_lock(record.id);
            let id = record.id;

            handles.push((
                id,
                tokio::spawn(async move {
                    let _guard = lock.lock().await;
                    let _permit = permit;
                    rekey_note(record, &metadata, &blobs, &old_key, &new_key, device_id, retry)
                        .await
                }),
            ));
        }

        let mut report = PasswordChangeReport::default();
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(())) => report.rotated.push(id),
                Ok(Err(err)) => {
                    warn!(note_id = %id, error = %err, "Note rotation failed");
                    report.failures.push(NoteFailure {
                        note_id: id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(note_id = %id, error = %err, "Note rotation task failed");
                    report.failures.push(NoteFailure {
                        note_id: id,
                        reason: format!("Task failed: {}", err),
                    });
                }
            }
        }

        if cancelled {
            warn!(
                rotated = report.rotated.len(),
                "Password rotation cancelled, keeping the current password"
            );
            return Ok(report);
        }
        if !report.failures.is_empty() {
            warn!(
                rotated = report.rotated.len(),
                failed = report.failures.len(),
                "Password rotation incomplete, keeping the current password"
            );
            return Ok(report);
        }

        self.vault.commit_password_change(rotation).await?;
        report.committed = true;
        info!(rotated = report.rotated.len(), "Password rotation committed");
        Ok(report)
    }

    async fn ensure_unlocked(&self) -> Result<()> {
        self.vault.active_key().await.map(|_| ())
    }

    async fn principal(&self) -> Result<Principal> {
        let principal = with_retry(self.config.retry, "auth.principal", || {
            self.auth.principal()
        })
        .await?;
        Ok(principal)
    }

    /// Fetch a record and enforce ownership. A note owned by another user
    /// is indistinguishable from a missing one.
    async fn fetch_owned_record(&self, id: Uuid, user_id: Uuid) -> Result<NoteRecord> {
        let record = with_retry(self.config.retry, "metadata.get", || self.metadata.get(id))
            .await?
            .ok_or(VellumError::NoteNotFound(id))?;
        if record.user_id != user_id {
            return Err(VellumError::NoteNotFound(id));
        }
        Ok(record)
    }

    fn note_lock(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.note_locks.lock().expect("mutex poisoned");
        locks.entry(id).or_default().clone()
    }

    /// Best-effort removal of a superseded blob revision. Failure leaves
    /// garbage in the blob store, never an inconsistent note.
    async fn delete_superseded_blob(&self, id: Uuid, old_path: &str, new_path: &str) {
        if old_path == new_path {
            return;
        }
        match self.blobs.delete(old_path).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => {
                warn!(note_id = %id, error = %err, "Superseded blob not deleted");
            }
        }
    }
}

/// Blob path for a new revision: `{user_id}/notes/{note_id}/{revision}.bin`.
fn blob_path(user_id: Uuid, note_id: Uuid) -> String {
    format!("{}/notes/{}/{}.bin", user_id, note_id, Uuid::new_v4())
}

fn note_view(record: &NoteRecord, payload: NotePlaintext) -> Note {
    Note {
        id: record.id,
        title: payload.title,
        content: payload.content,
        tags: record.tags.clone(),
        is_archived: record.is_archived,
        is_favorite: record.is_favorite,
        sync_version: record.sync_version,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

/// Fetch and decrypt one note. The unit of work for reads and batches.
async fn load_note(
    record: NoteRecord,
    blobs: &Arc<dyn BlobStore>,
    key: &DerivedKey,
    retry: RetryPolicy,
) -> Result<Note> {
    record.encryption_version.ensure_supported()?;
    let bytes = with_retry(retry, "blob.get", || blobs.get(&record.storage_path)).await?;
    let nonce = decode_nonce(&record.nonce)?;
    let plaintext = decrypt(&bytes, &nonce, key)?;
    let payload: NotePlaintext = serde_json::from_slice(&plaintext)?;
    Ok(note_view(&record, payload))
}

/// Re-encrypt one note under a new key. The unit of work for rotation.
///
/// A blob that already decrypts under the new key counts as rotated; a
/// partially applied rotation converges when re-run with the same pair.
/// `sync_version` bumps because the ciphertext changed; `content_hash`
/// stays, the plaintext did not.
async fn rekey_note(
    record: NoteRecord,
    metadata: &Arc<dyn MetadataStore>,
    blobs: &Arc<dyn BlobStore>,
    old_key: &DerivedKey,
    new_key: &DerivedKey,
    device_id: Uuid,
    retry: RetryPolicy,
) -> Result<()> {
    record.encryption_version.ensure_supported()?;
    let bytes = with_retry(retry, "blob.get", || blobs.get(&record.storage_path)).await?;
    let nonce = decode_nonce(&record.nonce)?;

    if decrypt(&bytes, &nonce, new_key).is_ok() {
        debug!(note_id = %record.id, "Note already encrypted under the new key");
        return Ok(());
    }

    let plaintext = decrypt(&bytes, &nonce, old_key)?;
    let sealed = encrypt(&plaintext, new_key)?;
    let new_path = blob_path(record.user_id, record.id);
    let stored_path = with_retry(retry, "blob.put", || {
        blobs.put(&new_path, sealed.ciphertext.clone())
    })
    .await?;

    let patch = RecordPatch {
        storage_path: Some(stored_path.clone()),
        nonce: Some(sealed.nonce_base64()),
        device_id: Some(device_id),
        sync_version: Some(record.sync_version + 1),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    let update = with_retry(retry, "metadata.update", || {
        metadata.update(record.id, patch.clone())
    })
    .await;
    if let Err(err) = update {
        if let Err(cleanup) = blobs.delete(&stored_path).await {
            warn!(note_id = %record.id, error = %cleanup, "Orphaned blob cleanup failed");
        }
        return Err(err.into());
    }

    if record.storage_path != stored_path {
        match blobs.delete(&record.storage_path).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => {
                warn!(note_id = %record.id, error = %err, "Superseded blob not deleted");
            }
        }
    }
    Ok(())
}

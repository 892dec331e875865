//! In-memory collaborator implementations.
//!
//! Back the test suite and local development. All state sits behind
//! `Arc<Mutex<..>>` so clones share one store, the same way multiple
//! repository handles would share one backend. Lock scopes are short and
//! never held across `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::traits::{AuthProvider, BlobStore, MetadataStore, Principal, StoreError};
use crate::notes::types::{NoteRecord, RecordPatch};

/// In-memory `MetadataStore`.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    records: Arc<Mutex<HashMap<Uuid, NoteRecord>>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, across all users. Useful in tests.
    pub fn len(&self) -> usize {
        self.records.lock().expect("mutex poisoned").len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, id: Uuid) -> Result<Option<NoteRecord>, StoreError> {
        let records = self.records.lock().expect("mutex poisoned");
        Ok(records.get(&id).cloned())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<NoteRecord>, StoreError> {
        let records = self.records.lock().expect("mutex poisoned");
        let mut rows: Vec<NoteRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn insert(&self, record: NoteRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("mutex poisoned");
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "record already exists: {}",
                record.id
            )));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: RecordPatch) -> Result<NoteRecord, StoreError> {
        let mut records = self.records.lock().expect("mutex poisoned");
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("record: {}", id)))?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("mutex poisoned");
        records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("record: {}", id)))
    }
}

/// In-memory `BlobStore`.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs held. Useful in tests.
    pub fn len(&self) -> usize {
        self.blobs.lock().expect("mutex poisoned").len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a blob exists at `path`. Useful in tests.
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.lock().expect("mutex poisoned").contains_key(path)
    }

    /// Overwrite the bytes at `path` directly, bypassing `put`.
    ///
    /// Test hook for simulating on-storage corruption.
    pub fn tamper(&self, path: &str, bytes: Vec<u8>) {
        self.blobs
            .lock()
            .expect("mutex poisoned")
            .insert(path.to_string(), bytes);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let mut blobs = self.blobs.lock().expect("mutex poisoned");
        blobs.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let blobs = self.blobs.lock().expect("mutex poisoned");
        blobs
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("blob: {}", path)))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().expect("mutex poisoned");
        blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("blob: {}", path)))
    }
}

/// `AuthProvider` with a fixed principal.
#[derive(Clone)]
pub struct StaticAuth {
    principal: Principal,
}

impl StaticAuth {
    /// Provider that always returns the given user with a fixed test token.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            principal: Principal {
                user_id,
                access_token: "static-token".to_string(),
            },
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn principal(&self) -> Result<Principal, StoreError> {
        Ok(self.principal.clone())
    }
}

//! Device-local persistence of credential state.
//!
//! What gets persisted: the salt, the verifier, the suite version, and
//! the device id. What never does: the password, any hash of the
//! password, or the derived key. Losing this file means re-running setup;
//! stealing it yields nothing brute-forceable faster than Argon2id.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::EncryptionVersion;
use crate::error::Result;
use crate::fs::write_atomic;

/// AEAD seal of the fixed verifier marker under the vault key.
///
/// Unlock trial-decrypts this; a correct password is the only way to make
/// the tag authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierRecord {
    /// Base64 nonce
    pub nonce: String,

    /// Base64 ciphertext (marker plus tag)
    pub ciphertext: String,
}

/// Persisted credential state for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialState {
    /// Hex-encoded random salt, fixed at setup
    pub salt: String,

    /// Password verifier (see `VerifierRecord`)
    pub verifier: VerifierRecord,

    /// Suite the salt/verifier pair was written with
    pub encryption_version: EncryptionVersion,

    /// Device identity minted at setup
    pub device_id: Uuid,

    /// When setup ran
    pub created_at: DateTime<Utc>,

    /// Last verifier change (setup or password change)
    pub updated_at: DateTime<Utc>,
}

/// Persistence seam for credential state.
///
/// Implementations must make `save` atomic: a crash mid-write may lose
/// the update but never leave a half-written state behind.
pub trait CredentialStore: Send + Sync {
    /// Load the persisted state, if any.
    fn load(&self) -> Result<Option<CredentialState>>;

    /// Persist the state, replacing any previous one.
    fn save(&self, state: &CredentialState) -> Result<()>;

    /// Remove the persisted state. Idempotent.
    fn clear(&self) -> Result<()>;
}

/// Credential store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store state at the given path (conventionally `credentials.json`
    /// inside the app's data directory).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialState>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &CredentialState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory credential store for tests and embedders without a disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    state: Arc<Mutex<Option<CredentialState>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialState>> {
        Ok(self.state.lock().expect("mutex poisoned").clone())
    }

    fn save(&self, state: &CredentialState) -> Result<()> {
        *self.state.lock().expect("mutex poisoned") = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.state.lock().expect("mutex poisoned") = None;
        Ok(())
    }
}

//! Credential vault: device-local encryption session.
//!
//! The vault owns the lifecycle of the user's encryption credentials and
//! is the only holder of derived key material. It is an explicit,
//! dependency-injected session object: construct one per user session
//! and pass it by reference; there is exactly one active key per vault.
//!
//! ## State machine
//!
//! - `Uninitialized` -- no credentials on this device; `setup` is the only
//!   way forward
//! - `Locked` -- salt and verifier persisted, no key in memory
//! - `Unlocked` -- derived key held in memory, zeroized on lock/drop
//!
//! `clear` returns any state to `Uninitialized` and is irreversible: data
//! encrypted under cleared credentials cannot be recovered.
//!
//! ## Password verification
//!
//! Unlock derives a candidate key from the stored salt and trial-decrypts
//! the persisted verifier (an AEAD seal of a fixed marker). The Poly1305
//! tag check is constant-time and the stored record reveals neither the
//! password nor a crackable fast hash of it. All state transitions happen
//! behind one `RwLock` write guard, held across the derivation, so
//! concurrent setup or unlock calls serialize instead of interleaving.

pub mod store;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::{
    decode_nonce, decrypt, derive_key, encrypt, generate_salt, validate_password, DerivedKey,
    EncryptionVersion, CURRENT_VERSION,
};
use crate::error::{Result, VellumError};

pub use store::{
    CredentialState, CredentialStore, FileCredentialStore, MemoryCredentialStore, VerifierRecord,
};

/// Fixed marker sealed into the verifier at setup.
const VERIFIER_MARKER: &[u8] = b"vellum-password-verifier-v1";

/// Observable vault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    /// No credentials on this device
    Uninitialized,
    /// Credentials persisted, no key in memory
    Locked,
    /// Key in memory, ready for note operations
    Unlocked,
}

struct VaultInner {
    /// Persisted credential state; `None` means uninitialized
    state: Option<CredentialState>,

    /// Derived key; `Some` means unlocked
    key: Option<DerivedKey>,
}

/// In-flight password rotation handed out by `begin_password_change`.
///
/// Holds both keys so the repository can re-encrypt note blobs; nothing
/// is persisted until `commit_password_change`, so dropping this value
/// abandons the rotation and the old password stays fully valid.
#[derive(Debug)]
pub struct KeyRotation {
    current_key: DerivedKey,
    new_key: DerivedKey,
    verifier: VerifierRecord,
}

impl KeyRotation {
    /// Key the existing blobs are sealed under.
    pub fn current_key(&self) -> &DerivedKey {
        &self.current_key
    }

    /// Key the blobs are being re-sealed under.
    pub fn new_key(&self) -> &DerivedKey {
        &self.new_key
    }
}

/// Device-local credential state machine.
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    inner: RwLock<VaultInner>,
}

impl CredentialVault {
    /// Open a vault over the given credential store.
    ///
    /// Loads persisted state: present means `Locked`, absent means
    /// `Uninitialized`. Never derives a key.
    pub fn open(store: Arc<dyn CredentialStore>) -> Result<Self> {
        let state = store.load()?;
        Ok(Self {
            store,
            inner: RwLock::new(VaultInner { state, key: None }),
        })
    }

    /// Current state.
    pub async fn status(&self) -> VaultStatus {
        let inner = self.inner.read().await;
        match (&inner.state, &inner.key) {
            (None, _) => VaultStatus::Uninitialized,
            (Some(_), None) => VaultStatus::Locked,
            (Some(_), Some(_)) => VaultStatus::Unlocked,
        }
    }

    /// Whether note operations can run right now.
    pub async fn is_unlocked(&self) -> bool {
        self.inner.read().await.key.is_some()
    }

    /// The active key, for immediate encryption use.
    ///
    /// # Errors
    ///
    /// Returns `VellumError::NotReady` unless the vault is unlocked.
    pub async fn active_key(&self) -> Result<DerivedKey> {
        let inner = self.inner.read().await;
        if inner.state.is_none() {
            return Err(VellumError::NotReady("Encryption is not set up".to_string()));
        }
        inner
            .key
            .clone()
            .ok_or_else(|| VellumError::NotReady("Vault is locked".to_string()))
    }

    /// Device identity minted at setup.
    pub async fn device_id(&self) -> Result<Uuid> {
        let inner = self.inner.read().await;
        inner
            .state
            .as_ref()
            .map(|s| s.device_id)
            .ok_or_else(|| VellumError::NotReady("Encryption is not set up".to_string()))
    }

    /// Hex salt, exposed for backup tooling.
    pub async fn salt(&self) -> Result<String> {
        let inner = self.inner.read().await;
        inner
            .state
            .as_ref()
            .map(|s| s.salt.clone())
            .ok_or_else(|| VellumError::NotReady("Encryption is not set up".to_string()))
    }

    /// Suite version the credentials (and all new writes) use.
    pub async fn encryption_version(&self) -> Result<EncryptionVersion> {
        let inner = self.inner.read().await;
        inner
            .state
            .as_ref()
            .map(|s| s.encryption_version)
            .ok_or_else(|| VellumError::NotReady("Encryption is not set up".to_string()))
    }

    /// Create credentials on this device and unlock.
    ///
    /// Generates a fresh salt and device id, derives the key, persists
    /// salt + verifier atomically, and transitions to `Unlocked`.
    ///
    /// # Errors
    ///
    /// - `VellumError::AlreadyInitialized` if credentials exist; `clear`
    ///   them first if a reset is really intended
    /// - `VellumError::InvalidInput` if the password fails validation
    pub async fn setup(&self, password: &str) -> Result<()> {
        let mut inner = self.inner.write().await;

        if inner.state.is_some() {
            return Err(VellumError::AlreadyInitialized);
        }
        validate_password(password)?;

        let salt = generate_salt();
        let key = derive_in_background(password, &salt, CURRENT_VERSION).await?;
        let verifier = build_verifier(&key)?;

        let now = Utc::now();
        let state = CredentialState {
            salt,
            verifier,
            encryption_version: CURRENT_VERSION,
            device_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        self.store.save(&state)?;

        info!(device_id = %state.device_id, "Encryption credentials initialized");
        inner.state = Some(state);
        inner.key = Some(key);
        Ok(())
    }

    /// Attempt to unlock with a password.
    ///
    /// Returns `Ok(true)` and transitions to `Unlocked` when the password
    /// verifies; returns `Ok(false)` and leaves the state untouched when
    /// it does not. A wrong password is an expected outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns `VellumError::NotReady` if no credentials exist yet.
    pub async fn unlock(&self, password: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;

        let (salt, version, verifier) = match &inner.state {
            Some(state) => (
                state.salt.clone(),
                state.encryption_version,
                state.verifier.clone(),
            ),
            None => {
                return Err(VellumError::NotReady("Encryption is not set up".to_string()));
            }
        };

        let candidate = derive_in_background(password, &salt, version).await?;
        if verifier_matches(&verifier, &candidate) {
            inner.key = Some(candidate);
            info!("Vault unlocked");
            Ok(true)
        } else {
            warn!("Unlock attempt with incorrect password");
            Ok(false)
        }
    }

    /// Drop key material and return to `Locked`.
    ///
    /// Idempotent; a no-op on an uninitialized vault. The key is zeroized
    /// as it drops.
    pub async fn lock(&self) {
        let mut inner = self.inner.write().await;
        if inner.key.take().is_some() {
            info!("Vault locked");
        }
    }

    /// Start a password change: verify the current password, derive both
    /// keys, and prepare the new verifier.
    ///
    /// The caller re-encrypts every note with the returned rotation, then
    /// calls [`commit_password_change`](Self::commit_password_change).
    /// Until commit, nothing is persisted and the current password stays
    /// authoritative.
    ///
    /// # Errors
    ///
    /// - `VellumError::NotReady` if no credentials exist
    /// - `VellumError::Authentication` if `current` does not verify
    /// - `VellumError::InvalidInput` if `new` fails validation
    pub async fn begin_password_change(&self, current: &str, new: &str) -> Result<KeyRotation> {
        let mut inner = self.inner.write().await;

        let (salt, version, verifier) = match &inner.state {
            Some(state) => (
                state.salt.clone(),
                state.encryption_version,
                state.verifier.clone(),
            ),
            None => {
                return Err(VellumError::NotReady("Encryption is not set up".to_string()));
            }
        };
        validate_password(new)?;

        let current_key = derive_in_background(current, &salt, version).await?;
        if !verifier_matches(&verifier, &current_key) {
            warn!("Password change attempted with incorrect current password");
            return Err(VellumError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }
        // Verifying the current password is an unlock.
        inner.key = Some(current_key.clone());

        let new_key = derive_in_background(new, &salt, version).await?;
        let new_verifier = build_verifier(&new_key)?;

        Ok(KeyRotation {
            current_key,
            new_key,
            verifier: new_verifier,
        })
    }

    /// Commit a password rotation: persist the new verifier and swap the
    /// in-memory key.
    ///
    /// Call only after every note has been re-encrypted under
    /// `rotation.new_key()`; afterwards the old password stops unlocking
    /// this vault.
    pub async fn commit_password_change(&self, rotation: KeyRotation) -> Result<()> {
        let mut inner = self.inner.write().await;

        let state = inner
            .state
            .as_mut()
            .ok_or_else(|| VellumError::NotReady("Encryption is not set up".to_string()))?;

        let KeyRotation {
            new_key, verifier, ..
        } = rotation;

        state.verifier = verifier;
        state.updated_at = Utc::now();
        self.store.save(state)?;

        inner.key = Some(new_key);
        info!("Encryption password changed");
        Ok(())
    }

    /// Wipe credentials from this device. Irreversible.
    ///
    /// Notes encrypted under the cleared credentials become permanently
    /// undecryptable unless the same password is set up again with the
    /// same salt (which `setup` never does).
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        self.store.clear()?;
        inner.state = None;
        inner.key = None;
        info!("Encryption credentials cleared");
        Ok(())
    }
}

/// Run the memory-hard derivation off the async runtime.
async fn derive_in_background(
    password: &str,
    salt_hex: &str,
    version: EncryptionVersion,
) -> Result<DerivedKey> {
    let salt = hex::decode(salt_hex)
        .map_err(|_| VellumError::Crypto("Stored salt is not valid hex".to_string()))?;
    let password = password.to_string();
    tokio::task::spawn_blocking(move || derive_key(&password, &salt, version))
        .await
        .map_err(|e| VellumError::Other(format!("Key derivation task failed: {}", e)))?
}

fn build_verifier(key: &DerivedKey) -> Result<VerifierRecord> {
    let sealed = encrypt(VERIFIER_MARKER, key)?;
    Ok(VerifierRecord {
        nonce: sealed.nonce_base64(),
        ciphertext: BASE64.encode(&sealed.ciphertext),
    })
}

fn verifier_matches(verifier: &VerifierRecord, key: &DerivedKey) -> bool {
    let Ok(nonce) = decode_nonce(&verifier.nonce) else {
        return false;
    };
    let Ok(ciphertext) = BASE64.decode(&verifier.ciphertext) else {
        return false;
    };
    match decrypt(&ciphertext, &nonce, key) {
        Ok(marker) => marker == VERIFIER_MARKER,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_vault() -> (CredentialVault, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let vault = CredentialVault::open(store.clone()).unwrap();
        (vault, store)
    }

    #[tokio::test]
    async fn test_setup_transitions_to_unlocked() {
        let (vault, store) = memory_vault();
        assert_eq!(vault.status().await, VaultStatus::Uninitialized);

        vault.setup("first-password-123").await.unwrap();

        assert_eq!(vault.status().await, VaultStatus::Unlocked);
        assert!(vault.active_key().await.is_ok());

        let state = store.load().unwrap().expect("state should be persisted");
        assert_eq!(state.salt.len(), 32); // 16 bytes hex-encoded
        assert!(hex::decode(&state.salt).is_ok());
    }

    #[tokio::test]
    async fn test_setup_twice_fails() {
        let (vault, _) = memory_vault();
        vault.setup("first-password-123").await.unwrap();

        let err = vault.setup("another-password-456").await.unwrap_err();
        assert!(matches!(err, VellumError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_setup_rejects_weak_password() {
        let (vault, store) = memory_vault();

        let err = vault.setup("short").await.unwrap_err();
        assert!(matches!(err, VellumError::InvalidInput(_)));
        assert_eq!(vault.status().await, VaultStatus::Uninitialized);
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlock_before_setup_fails() {
        let (vault, _) = memory_vault();
        let err = vault.unlock("whatever-password").await.unwrap_err();
        assert!(matches!(err, VellumError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_unlock_with_wrong_then_right_password() {
        let (vault, store) = memory_vault();
        vault.setup("correct-password-123").await.unwrap();
        vault.lock().await;
        assert_eq!(vault.status().await, VaultStatus::Locked);

        assert!(!vault.unlock("wrong-password-456").await.unwrap());
        assert_eq!(vault.status().await, VaultStatus::Locked);

        assert!(vault.unlock("correct-password-123").await.unwrap());
        assert_eq!(vault.status().await, VaultStatus::Unlocked);

        // A reopened vault over the same store starts locked
        let reopened = CredentialVault::open(store).unwrap();
        assert_eq!(reopened.status().await, VaultStatus::Locked);
        assert!(reopened.unlock("correct-password-123").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_unlock_does_not_lock_an_unlocked_vault() {
        let (vault, _) = memory_vault();
        vault.setup("correct-password-123").await.unwrap();

        assert!(!vault.unlock("wrong-password-456").await.unwrap());
        assert_eq!(vault.status().await, VaultStatus::Unlocked);
    }

    #[tokio::test]
    async fn test_lock_drops_key_and_is_idempotent() {
        let (vault, _) = memory_vault();
        vault.setup("correct-password-123").await.unwrap();

        vault.lock().await;
        assert_eq!(vault.status().await, VaultStatus::Locked);
        let err = vault.active_key().await.unwrap_err();
        assert!(matches!(err, VellumError::NotReady(_)));

        // Locking again (or before setup) is a no-op
        vault.lock().await;
        assert_eq!(vault.status().await, VaultStatus::Locked);
    }

    #[tokio::test]
    async fn test_clear_returns_to_uninitialized() {
        let (vault, store) = memory_vault();
        vault.setup("correct-password-123").await.unwrap();

        vault.clear().await.unwrap();
        assert_eq!(vault.status().await, VaultStatus::Uninitialized);
        assert!(store.load().unwrap().is_none());

        let err = vault.unlock("correct-password-123").await.unwrap_err();
        assert!(matches!(err, VellumError::NotReady(_)));

        // Setup works again after clear, with a fresh salt
        vault.setup("brand-new-password-789").await.unwrap();
        assert_eq!(vault.status().await, VaultStatus::Unlocked);
    }

    #[tokio::test]
    async fn test_password_change_swaps_verifier() {
        let (vault, _) = memory_vault();
        vault.setup("old-password-123").await.unwrap();

        let rotation = vault
            .begin_password_change("old-password-123", "new-password-456")
            .await
            .unwrap();
        vault.commit_password_change(rotation).await.unwrap();

        vault.lock().await;
        assert!(!vault.unlock("old-password-123").await.unwrap());
        assert!(vault.unlock("new-password-456").await.unwrap());
    }

    #[tokio::test]
    async fn test_password_change_requires_current_password() {
        let (vault, _) = memory_vault();
        vault.setup("old-password-123").await.unwrap();

        let err = vault
            .begin_password_change("guessed-wrong-999", "new-password-456")
            .await
            .unwrap_err();
        assert!(matches!(err, VellumError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_abandoned_rotation_keeps_old_password() {
        let (vault, _) = memory_vault();
        vault.setup("old-password-123").await.unwrap();

        let rotation = vault
            .begin_password_change("old-password-123", "new-password-456")
            .await
            .unwrap();
        drop(rotation);

        vault.lock().await;
        assert!(vault.unlock("old-password-123").await.unwrap());
        assert!(!vault.unlock("new-password-456").await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_keys_differ_and_current_matches_active() {
        let (vault, _) = memory_vault();
        vault.setup("old-password-123").await.unwrap();

        let rotation = vault
            .begin_password_change("old-password-123", "new-password-456")
            .await
            .unwrap();

        assert_ne!(
            rotation.current_key().as_bytes(),
            rotation.new_key().as_bytes()
        );
        let active = vault.active_key().await.unwrap();
        assert_eq!(active.as_bytes(), rotation.current_key().as_bytes());
    }

    #[tokio::test]
    async fn test_persisted_state_never_contains_password() {
        let (vault, store) = memory_vault();
        let password = "super-unique-password-abc";
        vault.setup(password).await.unwrap();

        let state = store.load().unwrap().unwrap();
        let serialized = serde_json::to_string(&state).unwrap();
        assert!(!serialized.contains(password));
    }

    #[tokio::test]
    async fn test_verifier_marker_round_trip() {
        let key = derive_key(
            "verifier-test-password",
            b"verifier-test-salt-16b",
            CURRENT_VERSION,
        )
        .unwrap();

        let verifier = build_verifier(&key).unwrap();
        assert!(verifier_matches(&verifier, &key));

        let other = derive_key(
            "different-password-xyz",
            b"verifier-test-salt-16b",
            CURRENT_VERSION,
        )
        .unwrap();
        assert!(!verifier_matches(&verifier, &other));
    }

    #[tokio::test]
    async fn test_verifier_with_mangled_encoding_never_matches() {
        let key = derive_key(
            "verifier-test-password",
            b"verifier-test-salt-16b",
            CURRENT_VERSION,
        )
        .unwrap();

        let verifier = VerifierRecord {
            nonce: "!!not-base64!!".to_string(),
            ciphertext: "AAAA".to_string(),
        };
        assert!(!verifier_matches(&verifier, &key));
    }
}

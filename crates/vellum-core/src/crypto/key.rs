//! Key derivation using Argon2id.
//!
//! Encryption keys are derived from the user's password with Argon2id, a
//! memory-hard KDF. The parameter set is looked up by `EncryptionVersion`
//! so a future version can raise costs without locking out existing
//! vaults.

use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::crypto::version::EncryptionVersion;
use crate::error::{Result, VellumError};

/// Length of derived keys in bytes (32 bytes = 256 bits for XChaCha20).
pub const KEY_LENGTH: usize = 32;

/// Length of generated salts in bytes.
pub const SALT_LENGTH: usize = 16;

/// Argon2id parameter set for one encryption version.
///
/// Version 1 uses 64 MiB of memory, 3 passes, and a single lane. One lane
/// keeps derivation time predictable on low-core mobile devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kb: u32,
    /// Number of passes over memory
    pub iterations: u32,
    /// Lanes (threads)
    pub parallelism: u32,
}

impl KdfParams {
    /// Look up the parameter set for an encryption version.
    ///
    /// # Errors
    ///
    /// Returns `VellumError::Crypto` for versions this build does not know.
    pub fn for_version(version: EncryptionVersion) -> Result<Self> {
        version.ensure_supported()?;
        match version.0 {
            1 => Ok(Self {
                memory_kb: 64 * 1024,
                iterations: 3,
                parallelism: 1,
            }),
            other => Err(VellumError::Crypto(format!(
                "No KDF parameters for encryption version: {}",
                other
            ))),
        }
    }
}

/// A 256-bit key derived from a password.
///
/// Key material is wiped from memory on drop, and the `Debug` impl never
/// prints it.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Wrap raw key bytes. Only derivation should mint these.
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Borrow the raw key bytes for an immediate cipher operation.
    ///
    /// Never persist or log the returned slice.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive an encryption key from a password and salt.
///
/// Deterministic: the same password, salt, and version always yield the
/// same key, which is how unlock recovers the key on every device that
/// shares the stored salt. Expect a call to take on the order of 100 ms;
/// callers on an async runtime should wrap it in
/// `tokio::task::spawn_blocking`.
///
/// # Errors
///
/// - `VellumError::InvalidInput` for an empty password or a salt shorter
///   than [`SALT_LENGTH`]
/// - `VellumError::Crypto` if the version is unknown or Argon2 rejects
///   the parameters
pub fn derive_key(password: &str, salt: &[u8], version: EncryptionVersion) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(VellumError::InvalidInput(
            "Cannot derive a key from an empty password".to_string(),
        ));
    }

    if salt.len() < SALT_LENGTH {
        return Err(VellumError::InvalidInput(format!(
            "Salt must be at least {} bytes (got {})",
            SALT_LENGTH,
            salt.len()
        )));
    }

    let kdf = KdfParams::for_version(version)?;

    let params = argon2::Params::new(
        kdf.memory_kb,
        kdf.iterations,
        kdf.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| VellumError::Crypto(format!("Failed to create Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key_bytes)
        .map_err(|e| VellumError::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey::from_bytes(key_bytes))
}

/// Generate a fresh random salt, hex-encoded for storage.
///
/// 16 bytes from the OS RNG; the hex form is what credential state and
/// backup tooling carry around.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

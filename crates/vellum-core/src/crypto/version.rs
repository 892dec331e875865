//! Encryption suite versioning.
//!
//! Every credential record and note record carries an `EncryptionVersion`
//! tag naming the KDF parameter set and AEAD suite it was written with.
//! Decrypt paths check the tag before touching key material, so a future
//! suite change can migrate old data instead of corrupting it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// Version tag for the key-derivation and encryption suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionVersion(pub u8);

/// The suite new data is written with: Argon2id (64 MiB, t=3, p=1) +
/// XChaCha20-Poly1305.
pub const CURRENT_VERSION: EncryptionVersion = EncryptionVersion(1);

/// Versions this build can decrypt.
pub const SUPPORTED_VERSIONS: &[EncryptionVersion] = &[EncryptionVersion(1)];

impl EncryptionVersion {
    /// Whether this build can decrypt data written under this version.
    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(self)
    }

    /// Error unless the version is supported.
    pub fn ensure_supported(&self) -> Result<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(VellumError::Crypto(format!(
                "Unsupported encryption version: {}",
                self.0
            )))
        }
    }
}

impl Default for EncryptionVersion {
    fn default() -> Self {
        CURRENT_VERSION
    }
}

impl std::fmt::Display for EncryptionVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version_supported() {
        assert!(CURRENT_VERSION.is_supported());
        assert!(CURRENT_VERSION.ensure_supported().is_ok());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let future = EncryptionVersion(99);
        assert!(!future.is_supported());
        let err = future.ensure_supported().unwrap_err();
        assert!(err.to_string().contains("Unsupported encryption version"));
    }

    #[test]
    fn test_version_serde_transparent() {
        let json = serde_json::to_string(&CURRENT_VERSION).unwrap();
        assert_eq!(json, "1");
        let back: EncryptionVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CURRENT_VERSION);
    }
}

//! Cryptographic operations for Vellum.
//!
//! This module provides key derivation, payload encryption, and content
//! hashing using well-audited libraries:
//! - **Argon2id**: Memory-hard key derivation function
//! - **XChaCha20-Poly1305**: Authenticated encryption with explicit nonces
//! - **SHA-256**: Content digests for sync change detection
//!
//! ## Security Model
//!
//! - Keys exist only in memory, derived on demand from the user's password
//! - Key material is zeroized on drop; `Debug` output is redacted
//! - Every ciphertext carries a fresh random nonce, stored in metadata
//! - No plaintext passwords or password hashes are ever persisted; the
//!   vault verifies passwords by trial-decrypting a known marker
//! - Parameter sets are versioned (`EncryptionVersion`) for migration
//!
//! ## Threat Model
//!
//! We defend against:
//! - A compromised server (sees only ciphertext, nonces, and digests)
//! - Theft of synced blobs and metadata
//! - Offline brute-force attacks on the password
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger on the device
//! - Access to an unlocked session / memory

pub mod cipher;
pub mod hash;
pub mod key;
pub mod password;
pub mod version;

pub use cipher::{decode_nonce, decrypt, encrypt, EncryptedContent, NONCE_LENGTH, TAG_LENGTH};
pub use hash::content_hash;
pub use key::{derive_key, generate_salt, DerivedKey, KdfParams, KEY_LENGTH, SALT_LENGTH};
pub use password::validate_password;
pub use version::{EncryptionVersion, CURRENT_VERSION, SUPPORTED_VERSIONS};

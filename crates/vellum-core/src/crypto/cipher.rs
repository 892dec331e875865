//! XChaCha20-Poly1305 encryption of note payloads.
//!
//! Every encryption call draws a fresh random 24-byte nonce from the OS
//! RNG and returns it alongside the ciphertext; the nonce is stored in
//! note metadata, the ciphertext in the blob store. The Poly1305 tag is
//! appended to the ciphertext, so any tamper (ciphertext, nonce, or key)
//! fails authentication instead of producing garbage plaintext.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::crypto::key::DerivedKey;
use crate::error::{Result, VellumError};

/// Length of the XChaCha20 nonce in bytes.
pub const NONCE_LENGTH: usize = 24;

/// Length of the Poly1305 authentication tag appended to ciphertext.
pub const TAG_LENGTH: usize = 16;

/// Ciphertext plus the nonce it was sealed with.
///
/// The two travel separately (blob store vs metadata record), so the pair
/// is explicit rather than concatenated into one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    /// Ciphertext with the 16-byte Poly1305 tag appended
    pub ciphertext: Vec<u8>,

    /// Nonce used for this encryption (unique per call)
    pub nonce: [u8; NONCE_LENGTH],
}

impl EncryptedContent {
    /// Nonce encoded for storage in a metadata record.
    pub fn nonce_base64(&self) -> String {
        BASE64.encode(self.nonce)
    }
}

/// Decode a base64 nonce from a metadata record.
///
/// # Errors
///
/// Returns `VellumError::Integrity` if the value is not valid base64 or
/// has the wrong length; a mangled nonce can never authenticate.
pub fn decode_nonce(encoded: &str) -> Result<[u8; NONCE_LENGTH]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| VellumError::Integrity(format!("Invalid nonce encoding: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| VellumError::Integrity("Nonce has wrong length".to_string()))
}

/// Encrypt a plaintext payload under a derived key.
///
/// # Arguments
///
/// * `plaintext` - The payload to seal (empty payloads are valid)
/// * `key` - Key derived from the user's password
///
/// # Returns
///
/// Returns the ciphertext together with the fresh nonce used to seal it.
///
/// # Security
///
/// The nonce comes from the OS RNG on every call and is never derived
/// from the content; reusing a nonce under the same key would break
/// confidentiality, and XChaCha20's 24-byte nonce makes random generation
/// collision-safe.
///
/// # Examples
///
/// ```
/// use vellum_core::crypto::{decrypt, derive_key, encrypt, CURRENT_VERSION};
///
/// let key = derive_key("my-secure-password", b"unique-salt-16-bytes", CURRENT_VERSION).unwrap();
/// let sealed = encrypt(b"secret note", &key).unwrap();
/// let opened = decrypt(&sealed.ciphertext, &sealed.nonce, &key).unwrap();
/// assert_eq!(opened, b"secret note");
/// ```
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<EncryptedContent> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| VellumError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedContent {
        ciphertext,
        nonce: nonce.into(),
    })
}

/// Decrypt a ciphertext payload under a derived key.
///
/// # Arguments
///
/// * `ciphertext` - Ciphertext with trailing Poly1305 tag
/// * `nonce` - The nonce stored alongside the ciphertext
/// * `key` - Key derived from the user's password
///
/// # Errors
///
/// Returns `VellumError::Integrity` if authentication fails for any
/// reason: wrong key, flipped ciphertext bits, or a mismatched nonce.
/// The check is the AEAD tag comparison, which does not leak timing
/// about how close the inputs were.
pub fn decrypt(ciphertext: &[u8], nonce: &[u8; NONCE_LENGTH], key: &DerivedKey) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| VellumError::Integrity("Ciphertext authentication failed".to_string()))
}

//! Content hashing for change detection.
//!
//! Sync compares notes by a digest of the decrypted content, so two
//! devices can recognize "same text, different metadata" without the
//! server ever seeing plaintext. The hash is computed client-side before
//! encryption and stored in the metadata record.

use sha2::{Digest, Sha256};

/// SHA-256 digest of note content, lowercase hex (64 characters).
///
/// Changes if and only if the content string changes; title and metadata
/// edits leave it untouched.
///
/// # Examples
///
/// ```
/// use vellum_core::crypto::content_hash;
///
/// let digest = content_hash("grocery list");
/// assert_eq!(digest.len(), 64);
/// assert_eq!(digest, content_hash("grocery list"));
/// ```
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(content_hash("note body"), content_hash("note body"));
    }

    #[test]
    fn test_hash_changes_with_content() {
        assert_ne!(content_hash("note body"), content_hash("note body!"));
    }

    #[test]
    fn test_hash_is_64_hex_chars() {
        let digest = content_hash("");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, digest.to_lowercase());
    }

    #[test]
    fn test_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

//! Collaborator interfaces for Vellum.
//!
//! This module defines the traits the core uses to reach its backing
//! services, plus in-memory reference implementations and the retry
//! helper wrapping every call site.
//!
//! ## Architecture
//!
//! The core is transport-agnostic:
//! - `MetadataStore` - note records (a relational table in production)
//! - `BlobStore` - ciphertext blobs (object storage in production)
//! - `AuthProvider` - verified principal per request
//!
//! Implementations only move bytes and rows; encryption, scoping, and
//! ordering guarantees are enforced on this side of the seam.
//!
//! ## Security
//!
//! Collaborators never receive key material or plaintext. Metadata rows
//! carry placeholder titles, nonces, and content digests; blobs are
//! AEAD-sealed before upload.

pub mod memory;
pub mod retry;
pub mod traits;

pub use memory::{MemoryBlobStore, MemoryMetadataStore, StaticAuth};
pub use retry::{with_retry, RetryPolicy};
pub use traits::{AuthProvider, BlobStore, MetadataStore, Principal, StoreError};

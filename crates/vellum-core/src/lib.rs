//! # Vellum Core
//!
//! Core library for Vellum - an end-to-end-encrypted notes system with
//! multi-device sync.
//!
//! This crate provides the credential/encryption lifecycle, encrypted
//! note CRUD, and the sync reconciliation logic, independent of any
//! server, transport, or UI. Host applications plug in backends through
//! the `storage` traits.
//!
//! ## Architecture
//!
//! - **crypto**: Key derivation, AEAD encryption, content hashing
//! - **vault**: Device-local credential state machine and key custody
//! - **notes**: Encrypted note repository over metadata + blob stores
//! - **sync**: Pull-based multi-device reconciliation
//! - **storage**: Collaborator traits and in-memory reference stores
//! - **cancel**: Cooperative cancellation for bulk operations
//!
//! ## Security
//!
//! Note titles and content are encrypted client-side before anything
//! crosses a collaborator trait. Backends see ciphertext, placeholder
//! titles, content digests, and structural metadata - enough to store
//! and sync, never enough to read.

pub mod cancel;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod notes;
pub mod storage;
pub mod sync;
pub mod vault;

pub use cancel::CancelToken;
pub use error::{Result, VellumError};
pub use notes::{NewNote, Note, NoteBatch, NoteRepository, NoteUpdate, PasswordChangeReport};
pub use sync::{DeviceNoteSet, SyncEngine, SyncOutcome};
pub use vault::{CredentialVault, VaultStatus};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Multi-device synchronization.
//!
//! Pull-based: a device sends its cursor, the server replies with every
//! record and tombstone from that position forward plus a fresh cursor.
//! Reconciliation happens device-side against the local cache.
//!
//! The whole module works on metadata. Content stays in encrypted blobs
//! addressed by `storage_path`; equality of content is decided by
//! comparing digests, never by decrypting.

pub mod cursor;
pub mod engine;
pub mod types;

pub use cursor::SyncCursor;
pub use engine::{DeviceNoteSet, LocalNote, SyncEngine, SyncOutcome};
pub use types::{
    ConflictWinner, NoteTombstone, ServerSnapshot, SyncConflict, SyncMetadata, SyncRequest,
    SyncResponse,
};

//! Wire types for the pull-based sync protocol.
//!
//! Everything here is metadata: records, ids, cursors, timestamps. Note
//! content never appears on this wire; devices fetch blobs through the
//! blob store and decrypt locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notes::types::NoteRecord;

use super::cursor::SyncCursor;

/// Deletion journal entry kept by the server.
///
/// Tombstones let devices that were offline during a delete learn about
/// it on their next pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTombstone {
    /// The deleted note
    pub note_id: Uuid,

    /// When the delete was applied server-side
    pub deleted_at: DateTime<Utc>,
}

/// Pull request sent by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Requesting device
    pub device_id: Uuid,

    /// Cursor from the previous pull; `None` requests a full resync
    pub last_sync_cursor: Option<SyncCursor>,
}

/// Server reply to a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Records created or updated inside the window
    pub notes: Vec<NoteRecord>,

    /// Ids deleted inside the window
    pub deleted_note_ids: Vec<Uuid>,

    /// Position to echo back on the next pull
    pub sync_cursor: SyncCursor,

    /// Conflicts detected server-side; empty for pull replies
    pub conflicts: Vec<SyncConflict>,
}

/// Authoritative per-user state the server collects changes from.
#[derive(Debug, Clone, Default)]
pub struct ServerSnapshot {
    /// Live records
    pub notes: Vec<NoteRecord>,

    /// Deletion journal
    pub tombstones: Vec<NoteTombstone>,
}

/// Per-device sync registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// The device this registration belongs to
    pub device_id: Uuid,

    /// When this device last completed a pull
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Cursor to send on the next pull
    pub sync_cursor: Option<SyncCursor>,

    /// Cleared when a device is retired
    pub is_active: bool,
}

impl SyncMetadata {
    /// Registration for a device that has never synced.
    pub fn new(device_id: Uuid) -> Self {
        Self {
            device_id,
            last_sync_at: None,
            sync_cursor: None,
            is_active: true,
        }
    }
}

/// Which side of a conflict survived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictWinner {
    /// The device's pending edit stayed in place
    Local,

    /// The server's version replaced the local one
    Remote,
}

/// A divergence where both sides changed the same note.
///
/// The losing version rides along so callers can offer recovery; sync
/// never silently discards an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// The contested note
    pub note_id: Uuid,

    /// Who won
    pub winner: ConflictWinner,

    /// The device's record at detection time
    pub local: NoteRecord,

    /// The server's record; `None` when a remote deletion beat a pending
    /// local edit
    pub remote: Option<NoteRecord>,
}

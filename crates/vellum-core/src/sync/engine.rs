//! Reconciliation between a device's note cache and the server.
//!
//! The engine is stateless and operates on metadata only: versions,
//! digests, timestamps, tombstones. Plaintext and key material never
//! enter this module, so it can run on either side of the wire.
//!
//! ## Conflict policy
//!
//! A conflict exists only when the server has a newer version of a note
//! the device has edited but not synced. Equal content digests defuse it
//! (the text is identical, only metadata diverged). Real conflicts
//! resolve last-writer-wins by `updated_at`, server winning ties, and the
//! losing record is handed back in the outcome instead of being dropped.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::notes::types::NoteRecord;

use super::cursor::{window_start, SyncCursor};
use super::types::{
    ConflictWinner, ServerSnapshot, SyncConflict, SyncMetadata, SyncRequest, SyncResponse,
};

/// One entry in the device cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNote {
    /// Last known record
    pub record: NoteRecord,

    /// Set when the device changed the note after its last pull
    pub dirty: bool,
}

/// Device-side note cache plus this device's sync registration.
///
/// Serializable as a whole so embedders can persist it between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceNoteSet {
    notes: HashMap<Uuid, LocalNote>,
    metadata: SyncMetadata,
}

impl DeviceNoteSet {
    /// Empty cache for a device that has never synced.
    pub fn new(device_id: Uuid) -> Self {
        Self {
            notes: HashMap::new(),
            metadata: SyncMetadata::new(device_id),
        }
    }

    pub fn device_id(&self) -> Uuid {
        self.metadata.device_id
    }

    pub fn metadata(&self) -> &SyncMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&LocalNote> {
        self.notes.get(&id)
    }

    /// Insert or replace a record as synced.
    pub fn upsert_clean(&mut self, record: NoteRecord) {
        self.notes.insert(
            record.id,
            LocalNote {
                record,
                dirty: false,
            },
        );
    }

    /// Insert or replace a record as a pending local edit.
    pub fn record_local_edit(&mut self, record: NoteRecord) {
        self.notes.insert(record.id, LocalNote { record, dirty: true });
    }

    /// Flag an existing entry as edited. Returns false for unknown ids.
    pub fn mark_dirty(&mut self, id: Uuid) -> bool {
        match self.notes.get_mut(&id) {
            Some(entry) => {
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Ids with pending local edits, in stable order.
    pub fn dirty_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .notes
            .values()
            .filter(|entry| entry.dirty)
            .map(|entry| entry.record.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn remove(&mut self, id: Uuid) -> Option<LocalNote> {
        self.notes.remove(&id)
    }

    /// Pull request for this device's current position.
    pub fn pull_request(&self) -> SyncRequest {
        SyncRequest {
            device_id: self.metadata.device_id,
            last_sync_cursor: self.metadata.sync_cursor.clone(),
        }
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Ids inserted or fast-forwarded from the server
    pub applied: Vec<Uuid>,

    /// Ids removed by tombstones
    pub deleted: Vec<Uuid>,

    /// Divergences, losers preserved
    pub conflicts: Vec<SyncConflict>,
}

/// Stateless sync logic: the server half cuts change windows, the device
/// half folds responses into the local cache.
pub struct SyncEngine;

impl SyncEngine {
    /// Server half of a pull.
    ///
    /// Returns every record updated and every tombstone written at or
    /// after the device's cursor position, plus a fresh cursor cut at
    /// `now`. The inclusive boundary redelivers boundary writes;
    /// reconcile is idempotent, so at-least-once is safe where
    /// at-most-once would lose data. Missing or unreadable cursors widen
    /// the window to everything.
    pub fn collect_changes(
        snapshot: &ServerSnapshot,
        request: &SyncRequest,
        now: DateTime<Utc>,
    ) -> SyncResponse {
        let since = window_start(request.last_sync_cursor.as_ref());

        let mut notes: Vec<NoteRecord> = snapshot
            .notes
            .iter()
            .filter(|record| record.updated_at >= since)
            .cloned()
            .collect();
        notes.sort_by_key(|record| (record.updated_at, record.id));

        let deleted_note_ids: Vec<Uuid> = snapshot
            .tombstones
            .iter()
            .filter(|tombstone| tombstone.deleted_at >= since)
            .map(|tombstone| tombstone.note_id)
            .collect();

        debug!(
            device_id = %request.device_id,
            %since,
            notes = notes.len(),
            deleted = deleted_note_ids.len(),
            "Collected sync window"
        );

        SyncResponse {
            notes,
            deleted_note_ids,
            sync_cursor: SyncCursor::at(now),
            conflicts: Vec::new(),
        }
    }

    /// Device half of a pull: fold a server response into the local set.
    ///
    /// Deletions apply first and win over records in the same response.
    /// Records then apply per the conflict policy above. Finally the
    /// device's registration advances to the response cursor. Applying
    /// the same response twice is a no-op.
    pub fn reconcile(
        local: &mut DeviceNoteSet,
        response: &SyncResponse,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let tombstoned: HashSet<Uuid> = response.deleted_note_ids.iter().copied().collect();

        for id in &response.deleted_note_ids {
            match local.notes.remove(id) {
                Some(entry) if entry.dirty => {
                    // The note is gone server-side; the pending edit has
                    // nothing to attach to. Surface the dead copy.
                    warn!(note_id = %id, "Remote deletion discarded a pending local edit");
                    outcome.deleted.push(*id);
                    outcome.conflicts.push(SyncConflict {
                        note_id: *id,
                        winner: ConflictWinner::Remote,
                        local: entry.record,
                        remote: None,
                    });
                }
                Some(_) => outcome.deleted.push(*id),
                None => {}
            }
        }

        for incoming in &response.notes {
            if tombstoned.contains(&incoming.id) {
                continue;
            }
            let Some(entry) = local.notes.get_mut(&incoming.id) else {
                local.upsert_clean(incoming.clone());
                outcome.applied.push(incoming.id);
                continue;
            };

            if incoming.sync_version <= entry.record.sync_version {
                // Redelivery or stale window; the local copy is current
                continue;
            }
            if !entry.dirty {
                entry.record = incoming.clone();
                outcome.applied.push(incoming.id);
                continue;
            }
            if incoming.content_hash == entry.record.content_hash {
                // Same text on both sides; only metadata diverged
                entry.record = incoming.clone();
                entry.dirty = false;
                outcome.applied.push(incoming.id);
                continue;
            }

            if entry.record.updated_at > incoming.updated_at {
                warn!(note_id = %incoming.id, "Sync conflict, local edit wins");
                outcome.conflicts.push(SyncConflict {
                    note_id: incoming.id,
                    winner: ConflictWinner::Local,
                    local: entry.record.clone(),
                    remote: Some(incoming.clone()),
                });
            } else {
                warn!(note_id = %incoming.id, "Sync conflict, remote edit wins");
                outcome.conflicts.push(SyncConflict {
                    note_id: incoming.id,
                    winner: ConflictWinner::Remote,
                    local: entry.record.clone(),
                    remote: Some(incoming.clone()),
                });
                entry.record = incoming.clone();
                entry.dirty = false;
            }
        }

        local.metadata.last_sync_at = Some(now);
        local.metadata.sync_cursor = Some(response.sync_cursor.clone());
        info!(
            device_id = %local.metadata.device_id,
            applied = outcome.applied.len(),
            deleted = outcome.deleted.len(),
            conflicts = outcome.conflicts.len(),
            "Sync reconciled"
        );
        outcome
    }
}

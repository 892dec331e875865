use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use vellum_core::crypto::content_hash;
use vellum_core::notes::{NewNote, NoteUpdate, RepositoryConfig};
use vellum_core::storage::{
    MemoryBlobStore, MemoryMetadataStore, MetadataStore, RetryPolicy, StaticAuth,
};
use vellum_core::sync::{
    ConflictWinner, NoteTombstone, ServerSnapshot, SyncCursor, SyncRequest,
};
use vellum_core::vault::{CredentialVault, MemoryCredentialStore};
use vellum_core::{DeviceNoteSet, NoteRepository, SyncEngine};

const PASSWORD: &str = "sync-password-123";

struct Fixture {
    repo: NoteRepository,
    metadata: Arc<MemoryMetadataStore>,
    blobs: Arc<MemoryBlobStore>,
    vault: Arc<CredentialVault>,
    user_id: Uuid,
    tombstones: Vec<NoteTombstone>,
}

impl Fixture {
    async fn new() -> Self {
        let vault = Arc::new(
            CredentialVault::open(Arc::new(MemoryCredentialStore::new()))
                .expect("open should succeed"),
        );
        vault.setup(PASSWORD).await.expect("setup should succeed");

        let metadata = Arc::new(MemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let user_id = Uuid::new_v4();
        let repo = NoteRepository::new(
            vault.clone(),
            metadata.clone(),
            blobs.clone(),
            Arc::new(StaticAuth::new(user_id)),
        )
        .with_config(RepositoryConfig::default().with_retry(RetryPolicy::none()));

        Self {
            repo,
            metadata,
            blobs,
            vault,
            user_id,
            tombstones: Vec::new(),
        }
    }

    /// Server-side view: the authoritative records plus the deletion journal.
    async fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            notes: self
                .metadata
                .list(self.user_id)
                .await
                .expect("list should succeed"),
            tombstones: self.tombstones.clone(),
        }
    }

    async fn delete_with_tombstone(&mut self, id: Uuid) {
        self.repo.delete_note(id).await.expect("delete should succeed");
        self.tombstones.push(NoteTombstone {
            note_id: id,
            deleted_at: Utc::now(),
        });
    }
}

/// Millisecond cursors truncate; spacing writes apart keeps the window
/// assertions exact instead of relying on at-least-once redelivery.
async fn next_tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn test_new_device_bootstraps_from_empty_cursor() {
    let fixture = Fixture::new().await;
    let first = fixture
        .repo
        .create_note(NewNote::new("first", "alpha"))
        .await
        .expect("create should succeed");
    fixture
        .repo
        .create_note(NewNote::new("second", "beta"))
        .await
        .expect("create should succeed");

    let mut device = DeviceNoteSet::new(Uuid::new_v4());
    let request = device.pull_request();
    assert!(request.last_sync_cursor.is_none());

    let response = SyncEngine::collect_changes(&fixture.snapshot().await, &request, Utc::now());
    let outcome = SyncEngine::reconcile(&mut device, &response, Utc::now());

    assert_eq!(outcome.applied.len(), 2);
    assert!(outcome.conflicts.is_empty());
    assert_eq!(device.len(), 2);
    let cached = device.get(first.id).expect("note should be cached");
    assert!(!cached.dirty);
    assert_eq!(cached.record.content_hash, content_hash("alpha"));
    assert!(device.metadata().last_sync_at.is_some());
}

#[tokio::test]
async fn test_second_pull_delivers_only_the_window() {
    let fixture = Fixture::new().await;
    let edited = fixture
        .repo
        .create_note(NewNote::new("edited", "v1"))
        .await
        .expect("create should succeed");
    fixture
        .repo
        .create_note(NewNote::new("untouched", "same"))
        .await
        .expect("create should succeed");
    next_tick().await;

    let mut device = DeviceNoteSet::new(Uuid::new_v4());
    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    SyncEngine::reconcile(&mut device, &response, Utc::now());
    let first_cursor = device.metadata().sync_cursor.clone();
    next_tick().await;

    // Another device edits one note
    fixture
        .repo
        .update_note(edited.id, NoteUpdate::new().content("v2"))
        .await
        .expect("update should succeed");

    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    assert_eq!(response.notes.len(), 1, "only the edited note is in the window");
    assert_eq!(response.notes[0].id, edited.id);
    assert_eq!(response.notes[0].sync_version, 2);

    let outcome = SyncEngine::reconcile(&mut device, &response, Utc::now());
    assert_eq!(outcome.applied, vec![edited.id]);
    assert_eq!(
        device.get(edited.id).expect("cached").record.sync_version,
        2
    );
    assert_ne!(device.metadata().sync_cursor, first_cursor, "cursor advances");
}

#[tokio::test]
async fn test_remote_delete_reaches_offline_device() {
    let mut fixture = Fixture::new().await;
    let keep = fixture
        .repo
        .create_note(NewNote::new("keep", "stays"))
        .await
        .expect("create should succeed");
    let doomed = fixture
        .repo
        .create_note(NewNote::new("doomed", "goes"))
        .await
        .expect("create should succeed");
    next_tick().await;

    let mut device = DeviceNoteSet::new(Uuid::new_v4());
    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    SyncEngine::reconcile(&mut device, &response, Utc::now());
    assert_eq!(device.len(), 2);
    next_tick().await;

    // Deleted elsewhere while this device is offline
    fixture.delete_with_tombstone(doomed.id).await;

    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    assert!(response.notes.is_empty());
    assert_eq!(response.deleted_note_ids, vec![doomed.id]);

    let outcome = SyncEngine::reconcile(&mut device, &response, Utc::now());
    assert_eq!(outcome.deleted, vec![doomed.id]);
    assert!(outcome.conflicts.is_empty());
    assert_eq!(device.len(), 1);
    assert!(device.get(keep.id).is_some());
    assert!(device.get(doomed.id).is_none());
}

#[tokio::test]
async fn test_concurrent_edits_surface_a_conflict_with_the_loser() {
    let fixture = Fixture::new().await;
    let contested = fixture
        .repo
        .create_note(NewNote::new("contested", "base"))
        .await
        .expect("create should succeed");
    next_tick().await;

    // Device B syncs, then edits offline
    let mut device = DeviceNoteSet::new(Uuid::new_v4());
    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    SyncEngine::reconcile(&mut device, &response, Utc::now());
    next_tick().await;

    let mut offline_edit = device
        .get(contested.id)
        .expect("cached")
        .record
        .clone();
    offline_edit.content_hash = content_hash("offline edit");
    offline_edit.updated_at = Utc::now();
    device.record_local_edit(offline_edit);
    next_tick().await;

    // Device A edits the same note afterwards, so the server copy is newer
    fixture
        .repo
        .update_note(contested.id, NoteUpdate::new().content("server edit"))
        .await
        .expect("update should succeed");

    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    let outcome = SyncEngine::reconcile(&mut device, &response, Utc::now());

    assert_eq!(outcome.conflicts.len(), 1);
    let conflict = &outcome.conflicts[0];
    assert_eq!(conflict.note_id, contested.id);
    assert_eq!(conflict.winner, ConflictWinner::Remote);
    assert_eq!(conflict.local.content_hash, content_hash("offline edit"));
    assert_eq!(
        conflict
            .remote
            .as_ref()
            .expect("remote record should ride along")
            .content_hash,
        content_hash("server edit")
    );

    // The cache follows the winner and is clean again
    let cached = device.get(contested.id).expect("cached");
    assert_eq!(cached.record.content_hash, content_hash("server edit"));
    assert!(!cached.dirty);
    assert!(device.dirty_ids().is_empty());
}

#[tokio::test]
async fn test_corrupted_cursor_degrades_to_full_resync() {
    let fixture = Fixture::new().await;
    fixture
        .repo
        .create_note(NewNote::new("a", "1"))
        .await
        .expect("create should succeed");
    fixture
        .repo
        .create_note(NewNote::new("b", "2"))
        .await
        .expect("create should succeed");

    let mut device = DeviceNoteSet::new(Uuid::new_v4());
    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    SyncEngine::reconcile(&mut device, &response, Utc::now());
    assert_eq!(device.len(), 2);

    // A device with a mangled cursor gets the world again, harmlessly
    let request = SyncRequest {
        device_id: device.device_id(),
        last_sync_cursor: Some(SyncCursor::from_raw("cursor-####")),
    };
    let response = SyncEngine::collect_changes(&fixture.snapshot().await, &request, Utc::now());
    assert_eq!(response.notes.len(), 2, "full resync window");

    let outcome = SyncEngine::reconcile(&mut device, &response, Utc::now());
    assert!(outcome.applied.is_empty(), "re-applying is a no-op");
    assert!(outcome.conflicts.is_empty());
    assert_eq!(device.len(), 2);
}

#[tokio::test]
async fn test_synced_records_decrypt_on_the_second_device() {
    let fixture = Fixture::new().await;
    fixture
        .repo
        .create_note(NewNote::new("shared", "readable everywhere"))
        .await
        .expect("create should succeed");

    // Pull on a second device
    let mut device = DeviceNoteSet::new(Uuid::new_v4());
    let response =
        SyncEngine::collect_changes(&fixture.snapshot().await, &device.pull_request(), Utc::now());
    SyncEngine::reconcile(&mut device, &response, Utc::now());

    // The second device, unlocked with the same password, reads the note
    // through its own repository over the shared backends
    let second_repo = NoteRepository::new(
        fixture.vault.clone(),
        fixture.metadata.clone(),
        fixture.blobs.clone(),
        Arc::new(StaticAuth::new(fixture.user_id)),
    );
    let batch = second_repo
        .get_all_notes()
        .await
        .expect("batch should succeed");

    assert_eq!(batch.notes.len(), 1);
    assert_eq!(batch.notes[0].title, "shared");
    assert_eq!(batch.notes[0].content, "readable everywhere");
}

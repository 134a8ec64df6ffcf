//! Authoritative document store with fan-out to connected observers.
//!
//! Every submission replaces the whole document (last writer wins). Writes are
//! serialized on an internal lock, persisted before they are acknowledged,
//! then pushed to all subscribers through a tokio broadcast channel. A slow or
//! disconnected subscriber never holds up the writer: it just misses updates.
//!
//! The data file may also be rewritten by another process (the offline admin
//! commands, or a hand edit). Reads notice a changed modification time or
//! length, reload the file and push it to observers like any other commit.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use crate::document::{load_document, save_document, AttendanceDocument};
use crate::document::file::DocumentFileError;

/// Default number of updates buffered per subscriber before it starts lagging.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    File(#[from] DocumentFileError),
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("persistence task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A committed document as pushed to observers.
#[derive(Debug)]
pub struct DocumentUpdate {
    /// Server-local commit counter, starts at 1 for the first replacement.
    pub revision: u64,
    pub document: Arc<AttendanceDocument>,
    /// Compact JSON of `document`, encoded once for all observers.
    pub json: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self { modified: meta.modified().ok()?, len: meta.len() })
    }
}

#[derive(Clone)]
struct Snapshot {
    document: Arc<AttendanceDocument>,
    // what the data file looked like when `document` was read or written
    stamp: Option<FileStamp>,
}

pub struct SyncBroadcaster {
    path: PathBuf,
    current: RwLock<Snapshot>,
    write_lock: Mutex<()>,
    revision: AtomicU64,
    sender: broadcast::Sender<Arc<DocumentUpdate>>,
}

impl SyncBroadcaster {
    /// Opens the data file, loading its contents (or an empty document if it
    /// does not exist yet).
    pub fn open<P: AsRef<Path>>(path: P, channel_capacity: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = load_document(&path)?;
        log::info!(
            "Loaded {} training(s) and {} player(s) from {}",
            document.events.len(),
            document.players.len(),
            path.display()
        );
        Ok(Self::with_document(path, document, channel_capacity))
    }

    /// Starts from `document` and treats the file as it is right now as
    /// already seen.
    pub fn with_document(path: PathBuf, document: AttendanceDocument, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        let stamp = FileStamp::read(&path);
        Self {
            path,
            current: RwLock::new(Snapshot { document: Arc::new(document), stamp }),
            write_lock: Mutex::new(()),
            revision: AtomicU64::new(0),
            sender,
        }
    }

    /// Latest committed document, reloaded first if the data file was
    /// rewritten behind this store's back.
    pub async fn current(&self) -> Arc<AttendanceDocument> {
        {
            let snapshot = self.current.read().await;
            match FileStamp::read(&self.path) {
                Some(on_disk) if Some(on_disk) != snapshot.stamp => {}
                _ => return snapshot.document.clone(),
            }
        }
        self.reload_changed_file().await
    }

    async fn reload_changed_file(&self) -> Arc<AttendanceDocument> {
        let _guard = self.write_lock.lock().await;

        let snapshot = self.current.read().await.clone();
        let stamp = match FileStamp::read(&self.path) {
            Some(on_disk) if Some(on_disk) != snapshot.stamp => on_disk,
            // another reader already picked the change up
            _ => return snapshot.document,
        };

        let path = self.path.clone();
        let loaded = match tokio::task::spawn_blocking(move || load_document(&path)).await {
            Ok(Ok(document)) => document,
            Ok(Err(e)) => {
                log::warn!("Keeping last committed document, reload failed: {}", e);
                return snapshot.document;
            }
            Err(e) => {
                log::warn!("Keeping last committed document, reload task failed: {}", e);
                return snapshot.document;
            }
        };

        let document = Arc::new(loaded);
        let json = match serde_json::to_string(document.as_ref()) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Keeping last committed document, re-encoding failed: {}", e);
                return snapshot.document;
            }
        };

        *self.current.write().await = Snapshot { document: document.clone(), stamp: Some(stamp) };
        let revision = self.publish(document.clone(), json);
        log::info!("Reloaded {} after an outside change (revision {})", self.path.display(), revision);

        document
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers an observer. It receives every update committed after this
    /// call and nothing from before.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DocumentUpdate>> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Replaces the authoritative document and notifies every observer.
    ///
    /// There is no merge and no base-version check: a submission computed from
    /// a stale copy silently overwrites whatever was committed in between.
    /// Returns the new revision once the file is durably written. On a
    /// persistence error nothing changes and nothing is broadcast.
    pub async fn replace_document(&self, document: AttendanceDocument) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let document = Arc::new(document);
        let json = serde_json::to_string(document.as_ref())?;

        let path = self.path.clone();
        let to_disk = document.clone();
        tokio::task::spawn_blocking(move || save_document(&path, &to_disk)).await??;

        let stamp = FileStamp::read(&self.path);
        *self.current.write().await = Snapshot { document: document.clone(), stamp };
        let revision = self.publish(document, json);
        log::info!("Committed revision {} and notified {} observer(s)", revision, self.observer_count());

        Ok(revision)
    }

    // caller holds write_lock
    fn publish(&self, document: Arc<AttendanceDocument>, json: String) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        let update = Arc::new(DocumentUpdate { revision, document, json });
        // Err only means nobody is listening
        let _ = self.sender.send(update);
        revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Player, Status};
    use crate::mutation::{add_event, add_player, set_attendance_at};
    use crate::ranking::rank_all_events;
    use tempfile::tempdir;

    const EVENT: &str = "2025-02-03 19:30";

    fn seeded() -> AttendanceDocument {
        AttendanceDocument {
            events: vec![EVENT.into()],
            players: vec![Player::new("Y")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_replace_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();

        let doc = set_attendance_at(&seeded(), EVENT, "Y", Status::Going, 123).unwrap();
        let revision = store.replace_document(doc.clone()).await.unwrap();

        assert_eq!(revision, 1);
        assert_eq!(*store.current().await, doc);
        assert_eq!(load_document(store.path()).unwrap(), doc);
    }

    #[tokio::test]
    async fn test_open_loads_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        save_document(&path, &seeded()).unwrap();

        let store = SyncBroadcaster::open(&path, 16).unwrap();
        assert_eq!(*store.current().await, seeded());
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn test_every_observer_receives_full_document() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();

        let mut submitter = store.subscribe();
        let mut other = store.subscribe();
        assert_eq!(store.observer_count(), 2);

        store.replace_document(seeded()).await.unwrap();

        for rx in [&mut submitter, &mut other] {
            let update = rx.recv().await.unwrap();
            assert_eq!(update.revision, 1);
            assert_eq!(*update.document, seeded());
            let decoded: AttendanceDocument = serde_json::from_str(&update.json).unwrap();
            assert_eq!(decoded, seeded());
        }
    }

    #[tokio::test]
    async fn test_updates_arrive_in_commit_order() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();
        let mut rx = store.subscribe();

        let first = add_event(&AttendanceDocument::default(), "A").unwrap();
        let second = add_event(&first, "B").unwrap();
        store.replace_document(first).await.unwrap();
        store.replace_document(second.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().revision, 1);
        let last = rx.recv().await.unwrap();
        assert_eq!(last.revision, 2);
        assert_eq!(*last.document, second);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_nothing_until_next_commit() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();
        store.replace_document(seeded()).await.unwrap();

        let mut rx = store.subscribe();
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_commit_without_observers_succeeds() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();
        let rx = store.subscribe();
        drop(rx);

        assert_eq!(store.replace_document(seeded()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lagging_observer_does_not_block_writer() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 2).unwrap();
        let mut slow = store.subscribe();

        let mut doc = AttendanceDocument::default();
        for i in 0..5 {
            doc = add_event(&doc, &format!("E{}", i)).unwrap();
            store.replace_document(doc.clone()).await.unwrap();
        }

        assert!(matches!(slow.recv().await, Err(broadcast::error::RecvError::Lagged(_))));
        // after lagging, the observer resumes with the most recent updates
        let mut latest = None;
        while let Ok(update) = slow.try_recv() {
            latest = Some(update);
        }
        assert_eq!(*latest.unwrap().document, doc);
    }

    #[tokio::test]
    async fn test_persistence_failure_changes_nothing() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("missing").join("data.json"), 16).unwrap();
        let mut rx = store.subscribe();

        let result = store.replace_document(seeded()).await;

        assert!(matches!(result, Err(StoreError::File(DocumentFileError::Write { .. }))));
        assert_eq!(*store.current().await, AttendanceDocument::default());
        assert_eq!(store.revision(), 0);
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_stale_base_submissions_last_writer_wins() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();
        store.replace_document(seeded()).await.unwrap();

        // both clients start from the same snapshot
        let base = store.current().await;
        let from_a = add_player(&base, "X").unwrap();
        let from_b = set_attendance_at(&base, EVENT, "Y", Status::Going, 10).unwrap();

        store.replace_document(from_a).await.unwrap();
        store.replace_document(from_b.clone()).await.unwrap();

        let final_doc = store.current().await;
        assert_eq!(*final_doc, from_b);
        assert!(final_doc.player("Y").unwrap().is_going(EVENT));
        // A's player is lost: B never saw it
        assert!(final_doc.player("X").is_none());
    }

    #[tokio::test]
    async fn test_refetched_base_keeps_both_changes() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();
        store.replace_document(seeded()).await.unwrap();

        let base = store.current().await;
        let from_a = add_player(&base, "X").unwrap();
        store.replace_document(from_a).await.unwrap();

        let base = store.current().await;
        let from_b = set_attendance_at(&base, EVENT, "Y", Status::Going, 10).unwrap();
        store.replace_document(from_b).await.unwrap();

        let final_doc = store.current().await;
        assert!(final_doc.player("X").is_some());
        assert!(final_doc.player("Y").unwrap().is_going(EVENT));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_serialized() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SyncBroadcaster::open(dir.path().join("data.json"), 64).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let doc = add_event(&AttendanceDocument::default(), &format!("E{}", i)).unwrap();
                store.replace_document(doc).await.unwrap()
            }));
        }
        let mut revisions = Vec::new();
        for handle in handles {
            revisions.push(handle.await.unwrap());
        }
        revisions.sort();
        assert_eq!(revisions, (1..=8).collect::<Vec<u64>>());

        // the file holds exactly the last committed document
        assert_eq!(load_document(store.path()).unwrap(), *store.current().await);
    }

    #[tokio::test]
    async fn test_write_from_second_store_is_seen_and_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        save_document(&path, &seeded()).unwrap();

        let server = SyncBroadcaster::open(&path, 16).unwrap();
        let mut rx = server.subscribe();
        assert_eq!(*server.current().await, seeded());

        // an offline admin command opens its own store on the same file
        let admin = SyncBroadcaster::open(&path, 16).unwrap();
        let base = admin.current().await;
        admin.replace_document(add_player(&base, "X").unwrap()).await.unwrap();

        let seen = server.current().await;
        assert!(seen.player("X").is_some());
        let update = rx.try_recv().unwrap();
        assert_eq!(update.revision, 1);
        assert!(update.document.player("X").is_some());

        // the next server commit is built on the reloaded copy
        let next = set_attendance_at(&seen, EVENT, "Y", Status::Going, 10).unwrap();
        server.replace_document(next).await.unwrap();

        let on_disk = load_document(&path).unwrap();
        assert!(on_disk.player("X").is_some());
        assert!(on_disk.player("Y").unwrap().is_going(EVENT));
    }

    #[tokio::test]
    async fn test_hand_edited_join_ts_reorders_after_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut doc = add_player(&seeded(), "Z").unwrap();
        doc = set_attendance_at(&doc, EVENT, "Y", Status::Going, 1).unwrap();
        doc = set_attendance_at(&doc, EVENT, "Z", Status::Going, 2).unwrap();
        save_document(&path, &doc).unwrap();

        let server = SyncBroadcaster::open(&path, 16).unwrap();
        let before = server.current().await;
        assert_eq!(rank_all_events(&before, 1)[0].confirmed[0].name, "Y");

        // push Y behind Z; the longer number also changes the file length
        let raw = fs::read_to_string(&path).unwrap().replace("\"joinTs\": 1\n", "\"joinTs\": 1000\n");
        fs::write(&path, raw).unwrap();

        let after = server.current().await;
        assert_eq!(rank_all_events(&after, 1)[0].confirmed[0].name, "Z");
        assert_eq!(server.revision(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_outside_change_keeps_last_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        save_document(&path, &seeded()).unwrap();
        let server = SyncBroadcaster::open(&path, 16).unwrap();

        fs::write(&path, "{ half written").unwrap();

        assert_eq!(*server.current().await, seeded());
        assert_eq!(server.revision(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_file_is_not_reloaded() {
        let dir = tempdir().unwrap();
        let store = SyncBroadcaster::open(dir.path().join("data.json"), 16).unwrap();
        store.replace_document(seeded()).await.unwrap();
        let mut rx = store.subscribe();

        store.current().await;
        store.current().await;

        assert_eq!(store.revision(), 1);
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }
}

//! The local durable store.

use crate::backend::SnapshotBackend;
use crate::cache::ListingCache;
use crate::error::{StoreError, StoreResult};
use driftsync_protocol::{now_ms, LocalNote, OpStatus, SyncOperation, SyncStatus};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Tuning options for [`LocalStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Hard limit on the serialized snapshot size, if any.
    ///
    /// Exceeding it surfaces [`StoreError::QuotaExceeded`] and rolls the
    /// write back.
    pub max_snapshot_bytes: Option<usize>,
    /// Maximum number of cached listings.
    pub cache_entries: usize,
    /// Time-to-live for cached listings.
    pub cache_ttl: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_snapshot_bytes: None,
            cache_entries: 16,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// The notes on this page, newest first.
    pub items: Vec<LocalNote>,
    /// Total number of notes matching the filter.
    pub total: usize,
    /// Whether more pages follow.
    pub has_more: bool,
}

/// The serialized shape of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    notes: Vec<LocalNote>,
    queue: Vec<SyncOperation>,
    metadata: BTreeMap<String, String>,
    next_op_id: u64,
}

/// Secondary indexes over the note table.
#[derive(Debug, Default)]
struct Indexes {
    by_owner: HashMap<String, BTreeSet<String>>,
    // (updated_at, id) so iteration yields update-time order.
    by_updated: BTreeSet<(i64, String)>,
    by_status: HashMap<SyncStatus, BTreeSet<String>>,
    by_temp: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct Inner {
    notes: HashMap<String, LocalNote>,
    queue: BTreeMap<u64, SyncOperation>,
    metadata: BTreeMap<String, String>,
    next_op_id: u64,
    indexes: Indexes,
}

impl Inner {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut inner = Self {
            queue: snapshot.queue.into_iter().map(|op| (op.id, op)).collect(),
            metadata: snapshot.metadata,
            next_op_id: snapshot.next_op_id.max(1),
            ..Self::default()
        };
        for note in snapshot.notes {
            inner.index_insert(note);
        }
        inner
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            notes: self.notes.values().cloned().collect(),
            queue: self.queue.values().cloned().collect(),
            metadata: self.metadata.clone(),
            next_op_id: self.next_op_id,
        }
    }

    /// Inserts or replaces a note, keeping every index consistent.
    fn index_insert(&mut self, note: LocalNote) {
        self.index_remove(&note.id);

        self.indexes
            .by_owner
            .entry(note.owner_id.clone())
            .or_default()
            .insert(note.id.clone());
        self.indexes
            .by_updated
            .insert((note.updated_at, note.id.clone()));
        self.indexes
            .by_status
            .entry(note.sync_status)
            .or_default()
            .insert(note.id.clone());
        if let Some(temp) = &note.temp_id {
            self.indexes.by_temp.insert(temp.clone(), note.id.clone());
        }
        self.notes.insert(note.id.clone(), note);
    }

    /// Removes a note and all its index entries.
    fn index_remove(&mut self, id: &str) -> Option<LocalNote> {
        let note = self.notes.remove(id)?;
        if let Some(set) = self.indexes.by_owner.get_mut(&note.owner_id) {
            set.remove(id);
        }
        self.indexes.by_updated.remove(&(note.updated_at, note.id.clone()));
        if let Some(set) = self.indexes.by_status.get_mut(&note.sync_status) {
            set.remove(id);
        }
        if let Some(temp) = &note.temp_id {
            self.indexes.by_temp.remove(temp);
        }
        Some(note)
    }
}

/// Durable, indexed storage for notes, the sync queue, and metadata.
///
/// Three logical tables live behind one serialized snapshot:
///
/// - `notes` — keyed by id, with secondary indexes on owner, update
///   time, sync status, and temporary id
/// - `queue` — pending [`SyncOperation`]s keyed by operation id
/// - `metadata` — process-wide string key/value facts
///
/// # Durability
///
/// Every mutating call commits the whole snapshot through the backend
/// before returning. Batched variants (`put_batch`, `delete_batch`)
/// commit once, all-or-nothing. A failed commit rolls the in-memory
/// state back to the last persisted snapshot; callers never observe a
/// half-applied write.
///
/// # Caching
///
/// Listings are served through a bounded TTL cache which is invalidated
/// on every write, conservatively.
pub struct LocalStore {
    inner: RwLock<Inner>,
    backend: Mutex<Box<dyn SnapshotBackend>>,
    cache: ListingCache,
    // Last successfully persisted snapshot, for rollback.
    last_good: Mutex<Vec<u8>>,
    max_snapshot_bytes: Option<usize>,
}

impl LocalStore {
    /// Opens a store over the given backend with default options.
    ///
    /// # Errors
    ///
    /// Initialization failure is fatal: an unreadable or undecodable
    /// snapshot is reported to the caller, never silently discarded.
    pub fn open(backend: Box<dyn SnapshotBackend>) -> StoreResult<Self> {
        Self::open_with(backend, StoreOptions::default())
    }

    /// Opens a store with explicit options.
    pub fn open_with(
        mut backend: Box<dyn SnapshotBackend>,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        let loaded = backend.load()?;
        let snapshot = match &loaded {
            Some(bytes) => decode_snapshot(bytes)?,
            None => Snapshot::default(),
        };
        let inner = Inner::from_snapshot(snapshot);
        debug!(
            notes = inner.notes.len(),
            queued = inner.queue.len(),
            "opened local store"
        );

        let last_good = match loaded {
            Some(bytes) => bytes,
            None => encode_snapshot(&inner.to_snapshot())?,
        };

        Ok(Self {
            inner: RwLock::new(inner),
            backend: Mutex::new(backend),
            cache: ListingCache::new(options.cache_entries, options.cache_ttl),
            last_good: Mutex::new(last_good),
            max_snapshot_bytes: options.max_snapshot_bytes,
        })
    }

    /// Runs a mutation and commits the result durably.
    ///
    /// On persist failure the in-memory state is rolled back to the last
    /// persisted snapshot and the error is returned.
    fn commit<T>(&self, mutate: impl FnOnce(&mut Inner) -> StoreResult<T>) -> StoreResult<T> {
        let mut inner = self.inner.write();
        let result = mutate(&mut inner)?;

        let bytes = encode_snapshot(&inner.to_snapshot())?;
        if let Some(limit) = self.max_snapshot_bytes {
            if bytes.len() > limit {
                self.rollback(&mut inner);
                return Err(StoreError::QuotaExceeded {
                    snapshot_bytes: bytes.len(),
                });
            }
        }
        if let Err(e) = self.backend.lock().persist(&bytes) {
            self.rollback(&mut inner);
            return Err(e);
        }

        *self.last_good.lock() = bytes;
        self.cache.invalidate_all();
        Ok(result)
    }

    fn rollback(&self, inner: &mut Inner) {
        warn!("store commit failed, rolling back to last persisted snapshot");
        match decode_snapshot(&self.last_good.lock()) {
            Ok(snapshot) => *inner = Inner::from_snapshot(snapshot),
            Err(e) => warn!(error = %e, "rollback decode failed; in-memory state unreverted"),
        }
    }

    // ---- note table ----

    /// Upserts a note by id, refreshing its `last_accessed_at`.
    pub fn put(&self, mut note: LocalNote) -> StoreResult<()> {
        note.last_accessed_at = now_ms();
        self.commit(|inner| {
            inner.index_insert(note);
            Ok(())
        })
    }

    /// Upserts several notes in one durable transaction.
    pub fn put_batch(&self, mut notes: Vec<LocalNote>) -> StoreResult<()> {
        let now = now_ms();
        for note in &mut notes {
            note.last_accessed_at = now;
        }
        self.commit(|inner| {
            for note in notes {
                inner.index_insert(note);
            }
            Ok(())
        })
    }

    /// Returns the note with the given id, if present.
    pub fn get(&self, id: &str) -> StoreResult<Option<LocalNote>> {
        Ok(self.inner.read().notes.get(id).cloned())
    }

    /// Returns notes sorted by update time, newest first.
    ///
    /// Without an owner filter the update-time index drives the order
    /// directly; with a filter the owner index is consulted first and
    /// the matches sorted in memory. Results are served through the
    /// listing cache.
    pub fn get_all(&self, owner: Option<&str>) -> StoreResult<Vec<LocalNote>> {
        let key = owner.map(str::to_string);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let inner = self.inner.read();
        let notes = match owner {
            None => inner
                .indexes
                .by_updated
                .iter()
                .rev()
                .filter_map(|(_, id)| inner.notes.get(id).cloned())
                .collect(),
            Some(owner) => {
                let mut notes: Vec<LocalNote> = inner
                    .indexes
                    .by_owner
                    .get(owner)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| inner.notes.get(id).cloned())
                    .collect();
                notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                notes
            }
        };
        drop(inner);

        self.cache.insert(key, notes.clone());
        Ok(notes)
    }

    /// Returns one page of notes, newest first.
    ///
    /// Scans the update-time index forward-only; only the page items are
    /// cloned, never the full collection.
    pub fn get_paginated(
        &self,
        owner: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Page> {
        let inner = self.inner.read();
        let mut total = 0usize;
        let mut items = Vec::new();

        for (_, id) in inner.indexes.by_updated.iter().rev() {
            let Some(note) = inner.notes.get(id) else {
                continue;
            };
            if let Some(owner) = owner {
                if note.owner_id != owner {
                    continue;
                }
            }
            if total >= offset && items.len() < limit {
                items.push(note.clone());
            }
            total += 1;
        }

        let has_more = offset + items.len() < total;
        Ok(Page {
            items,
            total,
            has_more,
        })
    }

    /// Replaces the record keyed by `old_id` with `note` in one commit.
    ///
    /// Used for id remapping: the temp-keyed record disappears and the
    /// permanent-keyed one appears atomically.
    pub fn replace(&self, old_id: &str, mut note: LocalNote) -> StoreResult<()> {
        note.last_accessed_at = now_ms();
        self.commit(|inner| {
            inner.index_remove(old_id);
            inner.index_insert(note);
            Ok(())
        })
    }

    /// Deletes a note by id. Missing ids are not an error.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.commit(|inner| {
            inner.index_remove(id);
            Ok(())
        })
    }

    /// Deletes several notes in one durable transaction.
    pub fn delete_batch(&self, ids: &[String]) -> StoreResult<()> {
        self.commit(|inner| {
            for id in ids {
                inner.index_remove(id);
            }
            Ok(())
        })
    }

    /// Looks a note up by its temporary id.
    pub fn find_by_temp_id(&self, temp_id: &str) -> StoreResult<Option<LocalNote>> {
        let inner = self.inner.read();
        Ok(inner
            .indexes
            .by_temp
            .get(temp_id)
            .and_then(|id| inner.notes.get(id))
            .cloned())
    }

    /// Deletes synced notes not accessed within the last `days` days.
    ///
    /// Notes with pending, syncing, or failed status are never touched:
    /// data awaiting sync is never silently dropped. Returns the number
    /// of notes deleted.
    pub fn cleanup_older_than(&self, days: u32) -> StoreResult<usize> {
        let cutoff = now_ms() - i64::from(days) * MS_PER_DAY;
        self.commit(|inner| {
            let stale: Vec<String> = inner
                .indexes
                .by_status
                .get(&SyncStatus::Synced)
                .into_iter()
                .flatten()
                .filter(|id| {
                    inner
                        .notes
                        .get(*id)
                        .is_some_and(|n| n.last_accessed_at < cutoff)
                })
                .cloned()
                .collect();
            for id in &stale {
                inner.index_remove(id);
            }
            if !stale.is_empty() {
                debug!(deleted = stale.len(), days, "cleaned up synced notes");
            }
            Ok(stale.len())
        })
    }

    /// Returns the number of stored notes, optionally per owner.
    pub fn count(&self, owner: Option<&str>) -> usize {
        let inner = self.inner.read();
        match owner {
            None => inner.notes.len(),
            Some(owner) => inner
                .indexes
                .by_owner
                .get(owner)
                .map_or(0, |set| set.len()),
        }
    }

    /// Removes every note, queued operation, and metadata entry.
    pub fn clear_all(&self) -> StoreResult<()> {
        self.commit(|inner| {
            *inner = Inner {
                next_op_id: inner.next_op_id,
                ..Inner::default()
            };
            Ok(())
        })
    }

    // ---- queue table ----

    /// Appends an operation to the queue, assigning an id if unset.
    ///
    /// Returns the stored operation with its assigned id.
    pub fn enqueue_op(&self, mut op: SyncOperation) -> StoreResult<SyncOperation> {
        self.commit(|inner| {
            if op.id == 0 {
                op.id = inner.next_op_id;
                inner.next_op_id += 1;
            } else {
                inner.next_op_id = inner.next_op_id.max(op.id + 1);
            }
            inner.queue.insert(op.id, op.clone());
            Ok(op)
        })
    }

    /// Returns queued operations ordered by enqueue time, oldest first.
    pub fn list_ops(&self, status: Option<OpStatus>) -> StoreResult<Vec<SyncOperation>> {
        let inner = self.inner.read();
        let mut ops: Vec<SyncOperation> = inner
            .queue
            .values()
            .filter(|op| status.is_none_or(|s| op.status == s))
            .cloned()
            .collect();
        ops.sort_by_key(|op| (op.timestamp, op.id));
        Ok(ops)
    }

    /// Returns one queued operation by id.
    pub fn get_op(&self, id: u64) -> StoreResult<Option<SyncOperation>> {
        Ok(self.inner.read().queue.get(&id).cloned())
    }

    /// Replaces a queued operation in place.
    ///
    /// # Errors
    ///
    /// [`StoreError::OpNotFound`] if the operation no longer exists.
    pub fn update_op(&self, op: SyncOperation) -> StoreResult<()> {
        self.commit(|inner| {
            if !inner.queue.contains_key(&op.id) {
                return Err(StoreError::OpNotFound(op.id));
            }
            inner.queue.insert(op.id, op);
            Ok(())
        })
    }

    /// Removes a queued operation. Returns whether it existed.
    pub fn remove_op(&self, id: u64) -> StoreResult<bool> {
        self.commit(|inner| Ok(inner.queue.remove(&id).is_some()))
    }

    /// Removes queued operations, optionally only those in one status.
    ///
    /// Returns the number removed.
    pub fn clear_ops(&self, status: Option<OpStatus>) -> StoreResult<usize> {
        self.commit(|inner| {
            let before = inner.queue.len();
            match status {
                None => inner.queue.clear(),
                Some(status) => inner.queue.retain(|_, op| op.status != status),
            }
            Ok(before - inner.queue.len())
        })
    }

    // ---- metadata table ----

    /// Sets a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.commit(|inner| {
            inner.metadata.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    /// Returns a metadata value.
    pub fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.read().metadata.get(key).cloned())
    }

    /// Removes a metadata value.
    pub fn delete_meta(&self, key: &str) -> StoreResult<()> {
        self.commit(|inner| {
            inner.metadata.remove(key);
            Ok(())
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("LocalStore")
            .field("notes", &inner.notes.len())
            .field("queued_ops", &inner.queue.len())
            .finish_non_exhaustive()
    }
}

fn encode_snapshot(snapshot: &Snapshot) -> StoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(snapshot, &mut bytes)
        .map_err(|e| StoreError::corrupted(format!("snapshot encode failed: {e}")))?;
    Ok(bytes)
}

fn decode_snapshot(bytes: &[u8]) -> StoreResult<Snapshot> {
    ciborium::from_reader(bytes)
        .map_err(|e| StoreError::corrupted(format!("snapshot decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use driftsync_protocol::{NoteDraft, NotePatch};
    use proptest::prelude::*;

    fn open_store() -> LocalStore {
        LocalStore::open(Box::new(MemoryBackend::new())).unwrap()
    }

    fn note(owner: &str, title: &str) -> LocalNote {
        LocalNote::from_draft(
            NoteDraft {
                title: title.into(),
                content: "content".into(),
                ..NoteDraft::default()
            },
            owner,
        )
    }

    #[test]
    fn put_then_get_roundtrip() {
        let store = open_store();
        let n = note("user-1", "a");
        store.put(n.clone()).unwrap();

        let loaded = store.get(&n.id).unwrap().unwrap();
        assert_eq!(loaded.title, "a");
        // put refreshes access time
        assert!(loaded.last_accessed_at >= n.last_accessed_at);
    }

    #[test]
    fn get_all_is_sorted_newest_first() {
        let store = open_store();
        for (i, title) in ["old", "mid", "new"].iter().enumerate() {
            let mut n = note("user-1", title);
            n.updated_at = 1000 + i as i64;
            store.put(n).unwrap();
        }

        let all = store.get_all(None).unwrap();
        let titles: Vec<&str> = all.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[test]
    fn get_all_filters_by_owner() {
        let store = open_store();
        store.put(note("user-1", "mine")).unwrap();
        store.put(note("user-2", "theirs")).unwrap();

        let mine = store.get_all(Some("user-1")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "mine");
    }

    #[test]
    fn listing_cache_never_serves_stale_data() {
        let store = open_store();
        store.put(note("user-1", "a")).unwrap();
        assert_eq!(store.get_all(None).unwrap().len(), 1);

        // A write after the cached read must invalidate.
        store.put(note("user-1", "b")).unwrap();
        assert_eq!(store.get_all(None).unwrap().len(), 2);
    }

    #[test]
    fn pagination_pages_through_all_notes() {
        let store = open_store();
        for i in 0..7 {
            let mut n = note("user-1", &format!("n{i}"));
            n.updated_at = i;
            store.put(n).unwrap();
        }

        let p1 = store.get_paginated(None, 3, 0).unwrap();
        assert_eq!(p1.items.len(), 3);
        assert_eq!(p1.total, 7);
        assert!(p1.has_more);
        assert_eq!(p1.items[0].title, "n6");

        let p3 = store.get_paginated(None, 3, 6).unwrap();
        assert_eq!(p3.items.len(), 1);
        assert!(!p3.has_more);
    }

    #[test]
    fn batch_put_is_atomic_under_quota() {
        let store = LocalStore::open_with(
            Box::new(MemoryBackend::new()),
            StoreOptions {
                max_snapshot_bytes: Some(600),
                ..StoreOptions::default()
            },
        )
        .unwrap();

        let batch: Vec<LocalNote> = (0..20)
            .map(|i| note("user-1", &format!("note number {i}")))
            .collect();
        let result = store.put_batch(batch);
        assert!(matches!(result, Err(StoreError::QuotaExceeded { .. })));

        // All-or-nothing: nothing from the failed batch is visible.
        assert_eq!(store.count(None), 0);
        assert_eq!(store.get_all(None).unwrap().len(), 0);
    }

    #[test]
    fn rollback_restores_state_on_persist_failure() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        struct FlakyBackend {
            inner: MemoryBackend,
            fail: Arc<AtomicBool>,
        }

        impl SnapshotBackend for FlakyBackend {
            fn load(&mut self) -> StoreResult<Option<Vec<u8>>> {
                self.inner.load()
            }

            fn persist(&mut self, snapshot: &[u8]) -> StoreResult<()> {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(StoreError::Io(std::io::Error::other("disk on fire")));
                }
                self.inner.persist(snapshot)
            }
        }

        let fail = Arc::new(AtomicBool::new(false));
        let store = LocalStore::open(Box::new(FlakyBackend {
            inner: MemoryBackend::new(),
            fail: Arc::clone(&fail),
        }))
        .unwrap();

        let survivor = note("user-1", "kept");
        store.put(survivor.clone()).unwrap();

        fail.store(true, Ordering::SeqCst);
        assert!(store.put(note("user-1", "lost")).is_err());

        // The survivor is visible, the failed write is not.
        let all = store.get_all(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, survivor.id);
    }

    #[test]
    fn find_by_temp_id_follows_the_index() {
        let store = open_store();
        let n = note("user-1", "offline");
        let temp = n.temp_id.clone().unwrap();
        store.put(n.clone()).unwrap();

        let found = store.find_by_temp_id(&temp).unwrap().unwrap();
        assert_eq!(found.id, n.id);

        // Remapping to a server id drops the temp index entry.
        let mut remapped = found;
        store.delete(&remapped.id).unwrap();
        remapped.adopt_server_id("srv-1");
        store.put(remapped).unwrap();
        assert!(store.find_by_temp_id(&temp).unwrap().is_none());
        assert!(store.get("srv-1").unwrap().is_some());
    }

    #[test]
    fn cleanup_only_touches_synced_notes() {
        let store = open_store();
        for status in [
            SyncStatus::Synced,
            SyncStatus::Pending,
            SyncStatus::Syncing,
            SyncStatus::Failed,
        ] {
            let mut n = note("user-1", &format!("{status:?}"));
            if status != SyncStatus::Pending {
                n.temp_id = None;
                n.id = format!("srv-{status:?}");
            }
            n.sync_status = status;
            n.last_accessed_at = 0;
            store.put(n.clone()).unwrap();
            // put() refreshed last_accessed_at; age it again directly.
            let mut aged = store.get(&n.id).unwrap().unwrap();
            aged.sync_status = status;
            aged.last_accessed_at = 0;
            store
                .commit(|inner| {
                    inner.index_insert(aged);
                    Ok(())
                })
                .unwrap();
        }

        let deleted = store.cleanup_older_than(30).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(None), 3);
        assert!(store.get("srv-Synced").unwrap().is_none());
    }

    #[test]
    fn store_survives_reopen() {
        // Simulate restart by carrying the snapshot over.
        let snapshot = {
            let store = LocalStore::open(Box::new(MemoryBackend::new())).unwrap();
            store.put(note("user-1", "persisted")).unwrap();
            store
                .enqueue_op(SyncOperation::update("srv-1", NotePatch::default()))
                .unwrap();
            store.set_meta("lastSyncTime", "12345").unwrap();
            let snapshot = store.last_good.lock().clone();
            snapshot
        };

        let store = LocalStore::open(Box::new(MemoryBackend::with_snapshot(snapshot))).unwrap();
        assert_eq!(store.count(None), 1);
        assert_eq!(store.list_ops(None).unwrap().len(), 1);
        assert_eq!(store.get_meta("lastSyncTime").unwrap().as_deref(), Some("12345"));
        // The op-id counter continues past persisted ids.
        let op = store
            .enqueue_op(SyncOperation::delete("srv-1"))
            .unwrap();
        assert_eq!(op.id, 2);
    }

    #[test]
    fn corrupted_snapshot_is_fatal_at_open() {
        let backend = MemoryBackend::with_snapshot(b"not cbor at all".to_vec());
        let result = LocalStore::open(Box::new(backend));
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn enqueue_assigns_monotonic_ids() {
        let store = open_store();
        let a = store
            .enqueue_op(SyncOperation::update("srv-1", NotePatch::default()))
            .unwrap();
        let b = store
            .enqueue_op(SyncOperation::update("srv-1", NotePatch::default()))
            .unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn update_op_requires_existing_id() {
        let store = open_store();
        let mut op = SyncOperation::update("srv-1", NotePatch::default());
        op.id = 99;
        assert!(matches!(
            store.update_op(op),
            Err(StoreError::OpNotFound(99))
        ));
    }

    #[test]
    fn clear_ops_by_status() {
        let store = open_store();
        let a = store
            .enqueue_op(SyncOperation::update("srv-1", NotePatch::default()))
            .unwrap();
        let mut failed = store
            .enqueue_op(SyncOperation::update("srv-2", NotePatch::default()))
            .unwrap();
        failed.status = OpStatus::Failed;
        store.update_op(failed).unwrap();

        let cleared = store.clear_ops(Some(OpStatus::Failed)).unwrap();
        assert_eq!(cleared, 1);
        assert!(store.get_op(a.id).unwrap().is_some());
    }

    #[test]
    fn metadata_roundtrip() {
        let store = open_store();
        assert_eq!(store.get_meta("k").unwrap(), None);
        store.set_meta("k", "v").unwrap();
        assert_eq!(store.get_meta("k").unwrap().as_deref(), Some("v"));
        store.delete_meta("k").unwrap();
        assert_eq!(store.get_meta("k").unwrap(), None);
    }

    proptest! {
        /// Whatever order operations are inserted in, listing returns
        /// them in non-decreasing timestamp order.
        #[test]
        fn ops_always_listed_in_timestamp_order(timestamps in proptest::collection::vec(0i64..10_000, 1..40)) {
            let store = open_store();
            for ts in &timestamps {
                let mut op = SyncOperation::update("srv-1", NotePatch::default());
                op.timestamp = *ts;
                store.enqueue_op(op).unwrap();
            }

            let listed = store.list_ops(None).unwrap();
            prop_assert_eq!(listed.len(), timestamps.len());
            for pair in listed.windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }

        /// Cleanup never deletes a note that still has unsynced changes,
        /// for any cutoff.
        #[test]
        fn cleanup_never_drops_unsynced_notes(days in 0u32..400) {
            let store = open_store();
            for (i, status) in [SyncStatus::Pending, SyncStatus::Syncing, SyncStatus::Failed]
                .into_iter()
                .enumerate()
            {
                let mut n = note("user-1", "unsynced");
                n.id = format!("srv-{i}");
                n.temp_id = None;
                n.sync_status = status;
                n.last_accessed_at = 0;
                store
                    .commit(|inner| {
                        inner.index_insert(n);
                        Ok(())
                    })
                    .unwrap();
            }

            store.cleanup_older_than(days).unwrap();
            prop_assert_eq!(store.count(None), 3);
        }
    }
}

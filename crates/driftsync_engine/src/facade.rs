//! Single entry point hiding online/offline branching from callers.

use crate::engine::{SyncEngine, SyncReport, LAST_SYNC_META_KEY};
use crate::error::{SyncError, SyncResult};
use crate::queue::OpQueue;
use crate::remote::RemoteApi;
use driftsync_protocol::{
    now_ms, LocalNote, NoteDraft, NotePatch, OpStatus, SyncOperation, SyncStatus,
};
use driftsync_store::LocalStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared connectivity flag, flipped by whoever watches the network.
///
/// Connectivity never gates writes; it only colors save outcomes and
/// decides when callers trigger a drain.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Connectivity {
    /// Creates a handle with the given initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Records a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns true while the network is believed reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Outcome of a facade write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Whether the local commit succeeded.
    pub success: bool,
    /// The note id the caller should use from now on (possibly
    /// temporary).
    pub note_id: String,
    /// Whether the write happened while offline.
    pub is_offline: bool,
    /// Whether a sync operation was queued for this write.
    pub needs_sync: bool,
}

/// Sync bookkeeping surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusSummary {
    /// Operations waiting for delivery.
    pub pending_operations: usize,
    /// End of the last successful drain (epoch ms), if any.
    pub last_sync_time: Option<i64>,
    /// Whether a drain is in flight right now.
    pub sync_in_progress: bool,
}

/// Offline-first entry point over the store, queue, and engine.
///
/// Every write lands locally first and queues a sync operation
/// regardless of connectivity; connectivity only affects when the
/// engine drains the queue, never whether the write is accepted.
///
/// An administrative switch gates all mutating calls: with offline
/// mode disabled they fail fast with [`SyncError::OfflineDisabled`]
/// instead of silently degrading to online-only behaviour.
pub struct OfflineFacade<R: RemoteApi> {
    store: Arc<LocalStore>,
    queue: OpQueue,
    engine: Arc<SyncEngine<R>>,
    connectivity: Connectivity,
    offline_enabled: AtomicBool,
}

impl<R: RemoteApi> OfflineFacade<R> {
    /// Creates a facade over the given store and engine.
    pub fn new(
        store: Arc<LocalStore>,
        engine: Arc<SyncEngine<R>>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            queue: OpQueue::new(Arc::clone(&store)),
            store,
            engine,
            connectivity,
            offline_enabled: AtomicBool::new(true),
        }
    }

    /// Flips the administrative offline-mode switch.
    pub fn set_offline_enabled(&self, enabled: bool) {
        self.offline_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Returns the connectivity handle.
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    fn gate(&self) -> SyncResult<()> {
        if self.offline_enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::OfflineDisabled)
        }
    }

    /// Creates a note locally and queues its delivery.
    ///
    /// The returned id is temporary until the create syncs; afterwards
    /// the note is found under its server id.
    pub fn save_note(&self, draft: NoteDraft, owner_id: &str) -> SyncResult<SaveOutcome> {
        self.gate()?;
        let note = LocalNote::from_draft(draft, owner_id);
        let note_id = note.id.clone();
        let patch = NotePatch::from_note(&note);
        self.store.put(note.clone())?;
        self.queue
            .enqueue(SyncOperation::create(note_id.clone(), note.temp_id, patch))?;
        debug!(note_id = %note_id, "saved note locally");
        Ok(self.outcome(note_id))
    }

    /// Applies a patch to a local note and queues its delivery.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] if no local record exists for `id` under
    /// this owner; [`SyncError::InvalidPatch`] for an empty or invalid
    /// patch.
    pub fn update_note(
        &self,
        id: &str,
        patch: NotePatch,
        owner_id: &str,
    ) -> SyncResult<SaveOutcome> {
        self.gate()?;
        patch.validate()?;
        let mut note = self.owned_note(id, owner_id)?;

        patch.apply_to(&mut note);
        note.updated_at = now_ms();
        note.sync_status = SyncStatus::Pending;
        self.store.put(note)?;
        self.queue
            .enqueue(SyncOperation::update(id, patch))?;
        Ok(self.outcome(id.to_string()))
    }

    /// Deletes a note locally and queues the remote delete.
    ///
    /// A note the server has never seen (still temp-keyed) is deleted
    /// locally and its queued operations dropped instead.
    pub fn delete_note(&self, id: &str, owner_id: &str) -> SyncResult<SaveOutcome> {
        self.gate()?;
        let note = self.owned_note(id, owner_id)?;

        self.store.delete(id)?;
        if note.has_temp_id() {
            for op in self.queue.get_queue(None)? {
                if op.note_id == id {
                    self.queue.dequeue(op.id)?;
                }
            }
            debug!(note_id = %id, "dropped never-synced note and its queued ops");
            let mut outcome = self.outcome(id.to_string());
            outcome.needs_sync = false;
            return Ok(outcome);
        }

        self.queue.enqueue(SyncOperation::delete(id))?;
        Ok(self.outcome(id.to_string()))
    }

    /// Returns a note by id.
    pub fn get_note(&self, id: &str) -> SyncResult<Option<LocalNote>> {
        Ok(self.store.get(id)?)
    }

    /// Returns the owner's notes, newest first.
    pub fn get_all_notes(&self, owner_id: &str) -> SyncResult<Vec<LocalNote>> {
        Ok(self.store.get_all(Some(owner_id))?)
    }

    /// Returns sync bookkeeping for display.
    pub fn get_sync_status(&self) -> SyncResult<SyncStatusSummary> {
        let last_sync_time = self
            .store
            .get_meta(LAST_SYNC_META_KEY)?
            .and_then(|v| v.parse().ok());
        Ok(SyncStatusSummary {
            pending_operations: self.queue.count(Some(OpStatus::Pending))?,
            last_sync_time,
            sync_in_progress: self.engine.is_sync_in_progress(),
        })
    }

    /// Triggers a drain on the underlying engine.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        self.engine.start_sync().await
    }

    fn owned_note(&self, id: &str, owner_id: &str) -> SyncResult<LocalNote> {
        self.store
            .get(id)?
            .filter(|note| note.owner_id == owner_id)
            .ok_or_else(|| SyncError::NotFound(format!("note {id}")))
    }

    fn outcome(&self, note_id: String) -> SaveOutcome {
        SaveOutcome {
            success: true,
            note_id,
            is_offline: !self.connectivity.is_online(),
            needs_sync: true,
        }
    }
}

impl<R: RemoteApi> std::fmt::Debug for OfflineFacade<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineFacade")
            .field(
                "offline_enabled",
                &self.offline_enabled.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

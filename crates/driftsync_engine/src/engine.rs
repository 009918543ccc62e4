//! The sync engine: drives the queue to empty against the remote API.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::hooks::{ConflictRequest, ProgressFeed, SyncProgress};
use crate::queue::OpQueue;
use crate::remote::RemoteApi;
use driftsync_protocol::{
    conflict, now_ms, BatchSyncRequest, LocalNote, NotePatch, OpStatus, OperationType, RemoteNote,
    SyncOperation, SyncStatus,
};
use driftsync_store::{LocalStore, StoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Metadata key recording the end of the last successful drain.
pub(crate) const LAST_SYNC_META_KEY: &str = "lastSyncTime";

/// Aggregate outcome of one sync drain.
///
/// Per-operation failures never propagate out of
/// [`SyncEngine::start_sync`]; they land here as counts and messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations attempted.
    pub total: usize,
    /// Operations delivered and dequeued.
    pub success: usize,
    /// Operations left failed (retry may follow).
    pub failed: usize,
    /// Failure messages keyed by operation id.
    pub errors: Vec<OpError>,
}

/// One failed operation inside a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpError {
    /// The failed operation's id.
    pub op_id: u64,
    /// Failure description.
    pub message: String,
}

/// How one operation's delivery attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Delivered to the server; the operation can be dequeued.
    Completed,
    /// Dequeued, but a follow-up operation now carries the work
    /// (conflict resolved locally, not yet pushed).
    Deferred,
}

/// Resets the in-flight flag when a drain exits by any path.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains the operation queue against a remote API.
///
/// One drain runs at a time: starting a second while one is in flight
/// fails with [`SyncError::SyncInProgress`]. Cancellation is
/// cooperative, checked between operations, and never aborts an
/// in-flight request (the transport's per-request timeout bounds
/// those).
pub struct SyncEngine<R: RemoteApi> {
    store: Arc<LocalStore>,
    queue: OpQueue,
    remote: R,
    config: SyncConfig,
    syncing: AtomicBool,
    cancelled: AtomicBool,
    progress: ProgressFeed,
    conflict_tx: RwLock<Option<mpsc::UnboundedSender<ConflictRequest>>>,
    retry_timers: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: RemoteApi> SyncEngine<R> {
    /// Creates an engine over the given store and remote.
    pub fn new(store: Arc<LocalStore>, remote: R, config: SyncConfig) -> Self {
        Self {
            queue: OpQueue::new(Arc::clone(&store)),
            store,
            remote,
            config,
            syncing: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            progress: ProgressFeed::new(),
            conflict_tx: RwLock::new(None),
            retry_timers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the queue manager this engine drains.
    pub fn queue(&self) -> &OpQueue {
        &self.queue
    }

    /// Returns the remote this engine delivers to.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns true while a drain is in flight.
    pub fn is_sync_in_progress(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Subscribes to progress events; dropping the receiver unsubscribes.
    pub fn subscribe_progress(&self) -> mpsc::UnboundedReceiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Registers the conflict-resolution channel.
    ///
    /// At most one is active; a new registration replaces the previous
    /// one. Without a registered channel, conflicted updates fail and
    /// retry like any other failure.
    pub fn conflict_requests(&self) -> mpsc::UnboundedReceiver<ConflictRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.conflict_tx.write() = Some(tx);
        rx
    }

    /// Requests cooperative cancellation of the current drain.
    ///
    /// Halts progression to the next operation and cancels scheduled
    /// retry timers. An in-flight request is not aborted.
    pub fn stop_sync(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let timers = std::mem::take(&mut *self.retry_timers.lock());
        for timer in &timers {
            timer.abort();
        }
        info!(cancelled_timers = timers.len(), "sync cancellation requested");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Drains pending operations to the remote.
    ///
    /// Small queues deliver one by one; at
    /// [`SyncConfig::batch_threshold`] and above, delivery switches to
    /// chunked batch calls. The drain continues until no pending work
    /// remains, including follow-up operations enqueued by conflict
    /// resolution.
    ///
    /// # Errors
    ///
    /// [`SyncError::SyncInProgress`] if a drain is already running.
    /// Store failures outside a single operation's attempt propagate;
    /// per-operation failures are aggregated into the report instead.
    pub async fn start_sync(&self) -> SyncResult<SyncReport> {
        // Set before the first suspension point so a second caller
        // observes the flag immediately.
        if self.syncing.swap(true, Ordering::SeqCst) {
            return Err(SyncError::SyncInProgress);
        }
        let _guard = DrainGuard(&self.syncing);
        self.cancelled.store(false, Ordering::SeqCst);

        let mut report = SyncReport::default();
        let mut resolved: HashSet<String> = HashSet::new();

        loop {
            if self.is_cancelled() {
                break;
            }
            let pending = self.queue.get_queue(Some(OpStatus::Pending))?;
            if pending.is_empty() {
                break;
            }

            debug!(pending = pending.len(), "drain pass starting");
            let follow_ups = if pending.len() >= self.config.batch_threshold {
                self.run_batched(pending, &mut report, &mut resolved).await?
            } else {
                self.run_individual(pending, &mut report, &mut resolved)
                    .await?
            };
            if follow_ups == 0 {
                break;
            }
        }

        if !self.is_cancelled() {
            self.store
                .set_meta(LAST_SYNC_META_KEY, &now_ms().to_string())?;
        }
        info!(
            total = report.total,
            success = report.success,
            failed = report.failed,
            "sync drain finished"
        );
        Ok(report)
    }

    async fn run_individual(
        &self,
        ops: Vec<SyncOperation>,
        report: &mut SyncReport,
        resolved: &mut HashSet<String>,
    ) -> SyncResult<usize> {
        let total = ops.len();
        let mut follow_ups = 0;
        for (done, op) in ops.iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            follow_ups += self.deliver_one(op, report, resolved).await?;
            self.progress
                .publish(SyncProgress::new(done + 1, total, Some(op.id)));
        }
        Ok(follow_ups)
    }

    async fn run_batched(
        &self,
        ops: Vec<SyncOperation>,
        report: &mut SyncReport,
        resolved: &mut HashSet<String>,
    ) -> SyncResult<usize> {
        let total = ops.len();
        let mut done = 0usize;
        let mut follow_ups = 0usize;

        // The field is public; guard against a zero size set directly.
        for chunk in ops.chunks(self.config.batch_size.max(1)) {
            if self.is_cancelled() {
                break;
            }
            let request = BatchSyncRequest::from_ops(chunk);
            match self.remote.batch_sync(&request).await {
                Ok(outcome) => {
                    let summary = outcome.response.summary;
                    debug!(
                        total = summary.total,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        "batch response received"
                    );
                    // Per-operation results are authoritative; a summary
                    // that disagrees with them is only worth a log line.
                    if summary.succeeded + summary.failed != outcome.response.results.len() {
                        warn!(
                            results = outcome.response.results.len(),
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "batch summary disagrees with returned results"
                        );
                    }
                    let mut covered = HashSet::new();
                    for result in &outcome.response.results {
                        covered.insert(result.op_id);
                        let Some(op) = chunk.iter().find(|o| o.id == result.op_id) else {
                            warn!(op_id = result.op_id, "batch result for unknown operation");
                            continue;
                        };
                        report.total += 1;
                        done += 1;
                        if result.success {
                            self.apply_batch_success(op, result.note_id.as_deref())?;
                            self.queue.dequeue(op.id)?;
                            report.success += 1;
                        } else {
                            let message = result
                                .error
                                .clone()
                                .unwrap_or_else(|| "rejected by server".to_string());
                            self.record_failure(op, &SyncError::transport_fatal(message), report)?;
                        }
                        self.progress
                            .publish(SyncProgress::new(done, total, Some(op.id)));
                    }

                    if outcome.partial_timeout {
                        warn!(
                            chunk = chunk.len(),
                            covered = covered.len(),
                            "batch timed out partway, finishing chunk individually"
                        );
                        for op in chunk.iter().filter(|o| !covered.contains(&o.id)) {
                            if self.is_cancelled() {
                                break;
                            }
                            done += 1;
                            follow_ups += self.deliver_one(op, report, resolved).await?;
                            self.progress
                                .publish(SyncProgress::new(done, total, Some(op.id)));
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        chunk = chunk.len(),
                        "batch call failed, falling back to individual delivery"
                    );
                    for op in chunk {
                        if self.is_cancelled() {
                            break;
                        }
                        done += 1;
                        follow_ups += self.deliver_one(op, report, resolved).await?;
                        self.progress
                            .publish(SyncProgress::new(done, total, Some(op.id)));
                    }
                }
            }
        }
        Ok(follow_ups)
    }

    /// Attempts one operation end to end, updating queue state and the
    /// report. Returns the number of follow-up operations enqueued.
    async fn deliver_one(
        &self,
        op: &SyncOperation,
        report: &mut SyncReport,
        resolved: &mut HashSet<String>,
    ) -> SyncResult<usize> {
        // Re-read through the status transition: an earlier delivery in
        // this pass may have remapped this operation's note id.
        let op = match self.queue.update_status(op.id, OpStatus::Syncing, None) {
            Ok(op) => op,
            // Dequeued concurrently: nothing left to deliver.
            Err(SyncError::NotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        self.set_note_status(&op.note_id, SyncStatus::Syncing)?;
        report.total += 1;

        match self.sync_operation(&op, resolved).await {
            Ok(Delivery::Completed) => {
                self.queue.dequeue(op.id)?;
                report.success += 1;
                Ok(0)
            }
            Ok(Delivery::Deferred) => {
                self.queue.dequeue(op.id)?;
                Ok(1)
            }
            Err(e) => {
                self.record_failure(&op, &e, report)?;
                Ok(0)
            }
        }
    }

    /// Dispatches one operation by type.
    async fn sync_operation(
        &self,
        op: &SyncOperation,
        resolved: &mut HashSet<String>,
    ) -> SyncResult<Delivery> {
        match op.op_type {
            OperationType::Create => self.sync_create(op).await,
            OperationType::Update => self.sync_update(op, resolved).await,
            OperationType::Delete => {
                // Deletions do not participate in conflict detection.
                self.remote.delete_note(&op.note_id).await?;
                Ok(Delivery::Completed)
            }
        }
    }

    async fn sync_create(&self, op: &SyncOperation) -> SyncResult<Delivery> {
        if let Some(temp) = &op.temp_id {
            // A prior attempt may have delivered before its ack was
            // lost. If no record is keyed by the temp id anymore, the
            // note already adopted a permanent id (or was deleted
            // locally); skip instead of duplicating the create.
            if self.store.find_by_temp_id(temp)?.is_none() {
                debug!(op_id = op.id, temp_id = %temp, "create already remapped, skipping");
                return Ok(Delivery::Completed);
            }
        }

        let created = self.remote.create_note(&op.data).await?;
        info!(op_id = op.id, server_id = %created.id, "note created remotely");
        if let Some(temp) = &op.temp_id {
            self.remap_temp_id(temp, &created.id, Some(created.updated_at_ms()))?;
        }
        Ok(Delivery::Completed)
    }

    async fn sync_update(
        &self,
        op: &SyncOperation,
        resolved: &mut HashSet<String>,
    ) -> SyncResult<Delivery> {
        let local = self.store.get(&op.note_id)?;

        if let Some(local) = &local {
            if !resolved.contains(&op.note_id) {
                if let Some(remote_note) = self.remote.fetch_note(&op.note_id).await? {
                    if conflict::detect_conflict(local, &remote_note) {
                        info!(note_id = %op.note_id, "conflict detected");
                        return self
                            .resolve_conflict(local.clone(), remote_note, resolved)
                            .await;
                    }
                }
            }
        }

        let updated = self.remote.update_note(&op.note_id, &op.data).await?;
        if let Some(mut local) = local {
            local.sync_status = SyncStatus::Synced;
            // Track the server's update time so the next conflict check
            // compares against what the server now holds.
            local.updated_at = updated.updated_at_ms();
            self.store.put(local)?;
        }
        Ok(Delivery::Completed)
    }

    /// Routes a detected conflict through the registered channel.
    async fn resolve_conflict(
        &self,
        local: LocalNote,
        remote_note: RemoteNote,
        resolved: &mut HashSet<String>,
    ) -> SyncResult<Delivery> {
        let note_id = local.id.clone();
        let tx = self.conflict_tx.read().clone();
        let Some(tx) = tx else {
            warn!(note_id = %note_id, "conflict detected with no handler registered");
            return Err(SyncError::UnresolvedConflict { note_id });
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ConflictRequest {
            info: conflict::conflict_info(&local, &remote_note),
            reply: reply_tx,
        };
        if tx.send(request).is_err() {
            // Receiver dropped: that channel is no longer a handler.
            *self.conflict_tx.write() = None;
            return Err(SyncError::UnresolvedConflict { note_id });
        }
        let decision = reply_rx.await.map_err(|_| SyncError::UnresolvedConflict {
            note_id: note_id.clone(),
        })?;

        let resolved_note =
            conflict::resolve(&local, &remote_note, decision.strategy, decision.merged.as_ref())?;
        let needs_follow_up = resolved_note.sync_status == SyncStatus::Pending;
        let patch = NotePatch::from_note(&resolved_note);
        self.store.put(resolved_note)?;

        if needs_follow_up {
            // The decision just made already covers this remote
            // snapshot; the follow-up skips the conflict check within
            // this drain.
            resolved.insert(note_id.clone());
            self.queue
                .enqueue(SyncOperation::update(note_id, patch))?;
            Ok(Delivery::Deferred)
        } else {
            Ok(Delivery::Completed)
        }
    }

    /// Rebinds a temp-keyed note and any queued operations still
    /// targeting the temp id to the server-issued id.
    fn remap_temp_id(
        &self,
        temp: &str,
        server_id: &str,
        updated_at: Option<i64>,
    ) -> SyncResult<()> {
        if let Some(local) = self.store.find_by_temp_id(temp)? {
            let old_id = local.id.clone();
            let mut adopted = local;
            adopted.adopt_server_id(server_id);
            if let Some(updated_at) = updated_at {
                adopted.updated_at = updated_at;
            }
            self.store.replace(&old_id, adopted)?;
        }

        for queued in self.queue.get_queue(None)? {
            // Create ops keep their temp id: the missing-temp-record
            // check is what makes a retried create a no-op.
            if queued.note_id == temp && queued.op_type != OperationType::Create {
                let mut rewritten = queued;
                rewritten.note_id = server_id.to_string();
                rewritten.temp_id = None;
                match self.store.update_op(rewritten) {
                    Ok(()) | Err(StoreError::OpNotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        debug!(temp_id = %temp, server_id = %server_id, "remapped temporary id");
        Ok(())
    }

    fn apply_batch_success(&self, op: &SyncOperation, server_id: Option<&str>) -> SyncResult<()> {
        match op.op_type {
            OperationType::Create => {
                if let (Some(temp), Some(server_id)) = (&op.temp_id, server_id) {
                    self.remap_temp_id(temp, server_id, None)?;
                }
            }
            OperationType::Update => {
                self.set_note_status(&op.note_id, SyncStatus::Synced)?;
            }
            OperationType::Delete => {}
        }
        Ok(())
    }

    /// Marks the operation failed and, while the retry budget lasts,
    /// schedules it to become pending again after the fixed delay.
    fn record_failure(
        &self,
        op: &SyncOperation,
        err: &SyncError,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        warn!(op_id = op.id, error = %err, "operation delivery failed");
        report.failed += 1;
        report.errors.push(OpError {
            op_id: op.id,
            message: err.to_string(),
        });
        self.set_note_status(&op.note_id, SyncStatus::Failed)?;

        let updated = match self
            .queue
            .update_status(op.id, OpStatus::Failed, Some(err.to_string()))
        {
            Ok(op) => op,
            Err(SyncError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        if updated.retry_count < self.config.max_retries {
            self.schedule_retry(updated.id);
        } else {
            debug!(op_id = op.id, retry_count = updated.retry_count, "retry budget exhausted");
        }
        Ok(())
    }

    fn schedule_retry(&self, op_id: u64) {
        let queue = self.queue.clone();
        let delay = self.config.retry_delay;
        debug!(op_id, ?delay, "scheduling retry");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.reset_to_pending(op_id) {
                warn!(op_id, error = %e, "retry reset failed");
            }
        });
        let mut timers = self.retry_timers.lock();
        timers.retain(|t| !t.is_finished());
        timers.push(handle);
    }

    fn set_note_status(&self, note_id: &str, status: SyncStatus) -> SyncResult<()> {
        if let Some(mut note) = self.store.get(note_id)? {
            if note.sync_status != status {
                note.sync_status = status;
                self.store.put(note)?;
            }
        }
        Ok(())
    }
}

impl<R: RemoteApi> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("syncing", &self.is_sync_in_progress())
            .finish_non_exhaustive()
    }
}

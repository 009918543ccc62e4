//! Queue semantics layered over the store's queue sub-API.

use crate::error::{SyncError, SyncResult};
use driftsync_protocol::{OpStatus, SyncOperation};
use driftsync_store::{LocalStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Ordering, filtering, and retry bookkeeping for queued operations.
///
/// An operation is in exactly one of pending, syncing, or failed at any
/// time, and leaves the queue only through [`dequeue`](Self::dequeue) or
/// an explicit [`clear`](Self::clear).
#[derive(Clone)]
pub struct OpQueue {
    store: Arc<LocalStore>,
}

impl OpQueue {
    /// Creates a queue over the given store.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Enqueues an operation, assigning its id.
    ///
    /// Returns the stored operation. Constructors already default
    /// `timestamp` to now, `retry_count` to zero, and status to pending.
    pub fn enqueue(&self, op: SyncOperation) -> SyncResult<SyncOperation> {
        let stored = self.store.enqueue_op(op)?;
        debug!(
            op_id = stored.id,
            op_type = ?stored.op_type,
            note_id = %stored.note_id,
            "enqueued operation"
        );
        Ok(stored)
    }

    /// Returns queued operations in non-decreasing timestamp order.
    pub fn get_queue(&self, status: Option<OpStatus>) -> SyncResult<Vec<SyncOperation>> {
        Ok(self.store.list_ops(status)?)
    }

    /// Removes an operation permanently (successful delivery).
    ///
    /// Already-removed ids are not an error.
    pub fn dequeue(&self, id: u64) -> SyncResult<()> {
        self.store.remove_op(id)?;
        Ok(())
    }

    /// Transitions an operation's status, recording the error message.
    ///
    /// A transition to failed increments `retry_count`; any other
    /// transition clears the stored error. Returns the updated operation.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] if the operation was dequeued concurrently.
    pub fn update_status(
        &self,
        id: u64,
        status: OpStatus,
        error: Option<String>,
    ) -> SyncResult<SyncOperation> {
        let mut op = self
            .store
            .get_op(id)?
            .ok_or_else(|| SyncError::NotFound(format!("operation {id}")))?;

        op.status = status;
        if status == OpStatus::Failed {
            op.retry_count += 1;
            op.error = error;
        } else {
            op.error = None;
        }

        match self.store.update_op(op.clone()) {
            Ok(()) => Ok(op),
            Err(StoreError::OpNotFound(_)) => {
                Err(SyncError::NotFound(format!("operation {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Makes a failed operation eligible again. Used by the retry
    /// scheduler; an operation dequeued in the meantime is a no-op.
    pub fn reset_to_pending(&self, id: u64) -> SyncResult<()> {
        match self.update_status(id, OpStatus::Pending, None) {
            Ok(_) => Ok(()),
            Err(SyncError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Returns failed operations still eligible for another attempt.
    pub fn failed_operations(&self, max_retries: u32) -> SyncResult<Vec<SyncOperation>> {
        Ok(self
            .get_queue(Some(OpStatus::Failed))?
            .into_iter()
            .filter(|op| op.retry_count < max_retries)
            .collect())
    }

    /// Returns true if any operation is waiting for delivery.
    pub fn has_pending(&self) -> SyncResult<bool> {
        Ok(!self.get_queue(Some(OpStatus::Pending))?.is_empty())
    }

    /// Returns the number of queued operations, optionally per status.
    pub fn count(&self, status: Option<OpStatus>) -> SyncResult<usize> {
        Ok(self.get_queue(status)?.len())
    }

    /// Removes queued operations, optionally only those in one status.
    ///
    /// Returns the number removed.
    pub fn clear(&self, status: Option<OpStatus>) -> SyncResult<usize> {
        Ok(self.store.clear_ops(status)?)
    }
}

impl std::fmt::Debug for OpQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpQueue").finish_non_exhaustive()
    }
}

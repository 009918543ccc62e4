//! Queued sync operations.

use crate::patch::NotePatch;
use crate::time::now_ms;
use serde::{Deserialize, Serialize};

/// Type of sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A note was created locally.
    Create,
    /// A note was modified locally.
    Update,
    /// A note was deleted locally.
    Delete,
}

/// Delivery state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    /// Waiting for delivery.
    Pending,
    /// A delivery attempt is in flight.
    Syncing,
    /// The last delivery attempt failed.
    Failed,
}

/// A single mutation waiting in the durable queue.
///
/// # Fields
///
/// - `id`: unique, monotonically increasing; assigned by the queue
/// - `note_id`: the target note, possibly a temporary id
/// - `data`: the partial payload to deliver
/// - `timestamp`: enqueue time; per-note delivery order follows it
/// - `retry_count`: number of failed delivery attempts so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Unique operation id. Zero until the queue assigns one.
    pub id: u64,
    /// Operation type.
    pub op_type: OperationType,
    /// Target note id (possibly temporary).
    pub note_id: String,
    /// The temporary id, if the target note was created offline.
    pub temp_id: Option<String>,
    /// Partial payload to deliver.
    pub data: NotePatch,
    /// Enqueue time (epoch ms). Delivery order key.
    pub timestamp: i64,
    /// Number of failed delivery attempts.
    pub retry_count: u32,
    /// Delivery state.
    pub status: OpStatus,
    /// Last delivery error, if any.
    pub error: Option<String>,
}

impl SyncOperation {
    /// Creates a pending operation with default bookkeeping.
    ///
    /// The id stays zero until [`enqueue`](../driftsync_engine/struct.OpQueue.html)
    /// assigns one.
    pub fn new(
        op_type: OperationType,
        note_id: impl Into<String>,
        temp_id: Option<String>,
        data: NotePatch,
    ) -> Self {
        Self {
            id: 0,
            op_type,
            note_id: note_id.into(),
            temp_id,
            data,
            timestamp: now_ms(),
            retry_count: 0,
            status: OpStatus::Pending,
            error: None,
        }
    }

    /// Creates a pending create operation.
    pub fn create(note_id: impl Into<String>, temp_id: Option<String>, data: NotePatch) -> Self {
        Self::new(OperationType::Create, note_id, temp_id, data)
    }

    /// Creates a pending update operation.
    pub fn update(note_id: impl Into<String>, data: NotePatch) -> Self {
        Self::new(OperationType::Update, note_id, None, data)
    }

    /// Creates a pending delete operation.
    pub fn delete(note_id: impl Into<String>) -> Self {
        Self::new(OperationType::Delete, note_id, None, NotePatch::default())
    }
}

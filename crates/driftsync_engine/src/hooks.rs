//! Channel-based progress and conflict hook surfaces.
//!
//! Hooks are typed channels rather than callbacks: subscribing returns a
//! receiver, and dropping that receiver is the unsubscribe.

use driftsync_protocol::{ConflictInfo, ConflictStrategy, NotePatch};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

/// A progress event, published after every operation or batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    /// Operations completed so far in this drain pass.
    pub current: usize,
    /// Operations in this drain pass.
    pub total: usize,
    /// Completion percentage, 0 to 100.
    pub percentage: u8,
    /// The operation this event reports on.
    pub op_id: Option<u64>,
}

impl SyncProgress {
    pub(crate) fn new(current: usize, total: usize, op_id: Option<u64>) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current * 100) / total).min(100) as u8
        };
        Self {
            current,
            total,
            percentage,
            op_id,
        }
    }
}

/// The caller's answer to a conflict request.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDecision {
    /// Chosen resolution strategy.
    pub strategy: ConflictStrategy,
    /// Merge data, required for manual merges.
    pub merged: Option<NotePatch>,
}

/// A detected conflict awaiting the caller's decision.
///
/// Send the decision through `reply`; dropping it without replying makes
/// the engine treat the conflict as unresolved (failure plus retry).
#[derive(Debug)]
pub struct ConflictRequest {
    /// Field-by-field comparison for a human decision.
    pub info: ConflictInfo,
    /// Reply handle for the chosen strategy.
    pub reply: oneshot::Sender<ConflictDecision>,
}

/// Fan-out feed of progress events.
///
/// Subscribers that dropped their receiver are pruned on the next
/// publish.
#[derive(Default)]
pub(crate) struct ProgressFeed {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<SyncProgress>>>,
}

impl ProgressFeed {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber; dropping the receiver unsubscribes.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes an event to every live subscriber.
    pub(crate) fn publish(&self, progress: SyncProgress) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(progress.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

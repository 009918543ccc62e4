//! Local note model.

use crate::time::now_ms;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix that marks a locally generated, not-yet-synced note id.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Generates a new temporary note id.
pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

/// Returns true if the id is a temporary (locally generated) id.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Sync state of a locally stored note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// The local copy matches the server's last known state.
    Synced,
    /// The note has local changes waiting for delivery.
    Pending,
    /// A delivery attempt for this note is in flight.
    Syncing,
    /// Delivery failed; the note is waiting for a retry.
    Failed,
}

impl SyncStatus {
    /// Returns true if the note still has undelivered local changes.
    ///
    /// Notes in any of these states must never be dropped by cleanup.
    pub fn is_unsynced(&self) -> bool {
        matches!(
            self,
            SyncStatus::Pending | SyncStatus::Syncing | SyncStatus::Failed
        )
    }
}

/// The fields a caller supplies when creating a note.
///
/// This is also the body of the remote create call: the entity payload
/// minus the id and local bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Optional short summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional category id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

/// A note as stored in the local durable store.
///
/// # Identity Invariant
///
/// Exactly one of the following holds:
/// - `id` is a server-issued (permanent) id and `temp_id` is `None`
/// - `id` is temporary and `temp_id == Some(id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalNote {
    /// Note id. Server-issued, or temporary while created offline.
    pub id: String,
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Optional short summary.
    pub summary: Option<String>,
    /// Tag names.
    pub tags: Vec<String>,
    /// Optional category id.
    pub category_id: Option<String>,
    /// Owning user id.
    pub owner_id: String,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Last modification time (epoch ms).
    pub updated_at: i64,
    /// Last local read or write time (epoch ms). Drives cleanup.
    pub last_accessed_at: i64,
    /// Sync state.
    pub sync_status: SyncStatus,
    /// The temporary id, present only while `id` is temporary.
    pub temp_id: Option<String>,
}

impl LocalNote {
    /// Creates a new note from a draft with a fresh temporary id.
    ///
    /// The note starts in [`SyncStatus::Pending`]: it exists locally but
    /// the server has not seen it.
    pub fn from_draft(draft: NoteDraft, owner_id: impl Into<String>) -> Self {
        let id = new_temp_id();
        let now = now_ms();
        Self {
            id: id.clone(),
            title: draft.title,
            content: draft.content,
            summary: draft.summary,
            tags: draft.tags,
            category_id: draft.category_id,
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            sync_status: SyncStatus::Pending,
            temp_id: Some(id),
        }
    }

    /// Returns true if this note still carries a temporary id.
    pub fn has_temp_id(&self) -> bool {
        self.temp_id.is_some()
    }

    /// Checks the identity invariant.
    pub fn identity_is_consistent(&self) -> bool {
        match &self.temp_id {
            Some(temp) => is_temp_id(&self.id) && *temp == self.id,
            None => !is_temp_id(&self.id),
        }
    }

    /// Rebinds this note to a server-issued id after a successful create.
    ///
    /// Clears `temp_id` and marks the note synced.
    pub fn adopt_server_id(&mut self, server_id: impl Into<String>) {
        self.id = server_id.into();
        self.temp_id = None;
        self.sync_status = SyncStatus::Synced;
    }

    /// Builds the create body for this note.
    pub fn as_draft(&self) -> NoteDraft {
        NoteDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            summary: self.summary.clone(),
            tags: self.tags.clone(),
            category_id: self.category_id.clone(),
        }
    }
}

//! Remote entity shapes.

use crate::note::{LocalNote, SyncStatus};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A tag as the server represents it (relational).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTag {
    /// Server-side tag id, when the server sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tag name.
    pub name: String,
}

/// A note as returned by the remote API.
///
/// Fetched on demand for conflict checks before an update; never stored
/// locally in this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    /// Server-issued id.
    pub id: String,
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Optional short summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Relational tag representation.
    #[serde(default)]
    pub tags: Vec<RemoteTag>,
    /// Optional category id.
    #[serde(default)]
    pub category_id: Option<String>,
    /// Owning user id.
    pub owner_id: String,
    /// Creation time as an ISO-8601 string, when the server sends one.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last server-side modification time as an ISO-8601 string.
    pub updated_at: String,
}

impl RemoteNote {
    /// The server's last-modified time in epoch milliseconds.
    ///
    /// An unparseable timestamp maps to 0 (the epoch), which makes the
    /// remote look maximally stale rather than maximally fresh: a bad
    /// server clock string can force a conflict prompt but can never
    /// silently overwrite local changes.
    pub fn updated_at_ms(&self) -> i64 {
        parse_iso_ms(&self.updated_at).unwrap_or(0)
    }

    /// Tag names, order preserved.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Converts to a fully synced local note.
    ///
    /// Used when first adopting server state for a note the local store
    /// has never seen.
    pub fn into_local(self, last_accessed_at: i64) -> LocalNote {
        let updated_at = self.updated_at_ms();
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_iso_ms)
            .unwrap_or(updated_at);
        LocalNote {
            id: self.id,
            title: self.title,
            content: self.content,
            summary: self.summary,
            tags: self.tags.into_iter().map(|t| t.name).collect(),
            category_id: self.category_id,
            owner_id: self.owner_id,
            created_at,
            updated_at,
            last_accessed_at,
            sync_status: SyncStatus::Synced,
            temp_id: None,
        }
    }
}

fn parse_iso_ms(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

//! Conflict detection and resolution.
//!
//! Everything in this module is a pure function over snapshots: detection
//! compares timestamps, resolution produces a new [`LocalNote`] value.
//! Persisting the result and re-enqueueing delivery are the engine's job.

use crate::note::{LocalNote, SyncStatus};
use crate::patch::{NotePatch, PatchError};
use crate::remote::RemoteNote;
use crate::time::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors from conflict resolution. These indicate caller contract
/// violations and are never converted into retries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConflictError {
    /// `ManualMerge` was requested without merge data.
    #[error("manual merge requested without merge data")]
    MissingMergeData,
    /// The supplied merge data failed validation.
    #[error("invalid merge data: {0}")]
    InvalidMergeData(#[from] PatchError),
}

/// How a detected conflict should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Keep every local field value and retry delivery.
    UseLocal,
    /// Adopt the remote field values; nothing left to deliver.
    UseRemote,
    /// Apply caller-supplied merge data over local and retry delivery.
    ManualMerge,
}

/// A detected conflict, for display and decision making. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictInfo {
    /// The local snapshot.
    pub local: LocalNote,
    /// The remote snapshot.
    pub remote: RemoteNote,
    /// Names of the fields whose values differ.
    pub conflict_fields: Vec<String>,
}

/// One differing field, both sides rendered for display.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    /// The local value.
    pub local: String,
    /// The remote value.
    pub remote: String,
}

/// Returns true if the local replica diverged from the server.
///
/// A conflict exists iff the local update time strictly exceeds the
/// server's: the local replica carries changes made after the server's
/// last known state. A merely stale local copy (local <= remote) needs
/// no resolution; the caller just adopts the remote state.
pub fn detect_conflict(local: &LocalNote, remote: &RemoteNote) -> bool {
    local.updated_at > remote.updated_at_ms()
}

/// Compares both snapshots field by field.
///
/// Tags are compared as an order-insensitive set. The result drives a
/// human decision UI; it has no effect on resolution itself.
pub fn conflict_info(local: &LocalNote, remote: &RemoteNote) -> ConflictInfo {
    let mut fields = Vec::new();

    if local.title != remote.title {
        fields.push("title".to_string());
    }
    if local.content != remote.content {
        fields.push("content".to_string());
    }
    if local.summary != remote.summary {
        fields.push("summary".to_string());
    }
    if local.category_id != remote.category_id {
        fields.push("categoryId".to_string());
    }
    let local_tags: BTreeSet<&str> = local.tags.iter().map(String::as_str).collect();
    let remote_names = remote.tag_names();
    let remote_tags: BTreeSet<&str> = remote_names.iter().map(String::as_str).collect();
    if local_tags != remote_tags {
        fields.push("tags".to_string());
    }

    ConflictInfo {
        local: local.clone(),
        remote: remote.clone(),
        conflict_fields: fields,
    }
}

/// Produces the resolved note for the chosen strategy.
///
/// - [`ConflictStrategy::UseLocal`]: keeps all local field values, marks the
///   note pending, and refreshes `updated_at` so the retried delivery is
///   recognized as newer than the remote snapshot just observed.
/// - [`ConflictStrategy::UseRemote`]: adopts the remote field values, marks
///   the note synced, and preserves local bookkeeping (`owner_id`,
///   `created_at`, `last_accessed_at`).
/// - [`ConflictStrategy::ManualMerge`]: applies `merged` over local, takes
///   the newer of the two update times, and marks the note pending since
///   the server has not seen the merge.
///
/// # Errors
///
/// `ManualMerge` without valid merge data is a caller contract violation
/// and fails fast with [`ConflictError`].
pub fn resolve(
    local: &LocalNote,
    remote: &RemoteNote,
    strategy: ConflictStrategy,
    merged: Option<&NotePatch>,
) -> Result<LocalNote, ConflictError> {
    match strategy {
        ConflictStrategy::UseLocal => {
            let mut resolved = local.clone();
            resolved.sync_status = SyncStatus::Pending;
            // Strictly newer than both the old local time and the remote
            // snapshot, even under a stalled clock.
            resolved.updated_at = now_ms()
                .max(local.updated_at + 1)
                .max(remote.updated_at_ms() + 1);
            Ok(resolved)
        }
        ConflictStrategy::UseRemote => {
            let mut resolved = local.clone();
            resolved.title = remote.title.clone();
            resolved.content = remote.content.clone();
            resolved.summary = remote.summary.clone();
            resolved.tags = remote.tag_names();
            resolved.category_id = remote.category_id.clone();
            resolved.updated_at = remote.updated_at_ms();
            resolved.sync_status = SyncStatus::Synced;
            Ok(resolved)
        }
        ConflictStrategy::ManualMerge => {
            let patch = merged.ok_or(ConflictError::MissingMergeData)?;
            patch.validate()?;
            let mut resolved = local.clone();
            patch.apply_to(&mut resolved);
            resolved.updated_at = local.updated_at.max(remote.updated_at_ms());
            resolved.sync_status = SyncStatus::Pending;
            Ok(resolved)
        }
    }
}

/// Renders every comparable field plus the update timestamps, for display.
pub fn differences(local: &LocalNote, remote: &RemoteNote) -> BTreeMap<String, FieldDiff> {
    let mut map = BTreeMap::new();
    let mut push = |name: &str, l: String, r: String| {
        if l != r {
            map.insert(name.to_string(), FieldDiff { local: l, remote: r });
        }
    };

    push("title", local.title.clone(), remote.title.clone());
    push("content", local.content.clone(), remote.content.clone());
    push(
        "summary",
        local.summary.clone().unwrap_or_default(),
        remote.summary.clone().unwrap_or_default(),
    );
    push(
        "categoryId",
        local.category_id.clone().unwrap_or_default(),
        remote.category_id.clone().unwrap_or_default(),
    );
    push(
        "tags",
        local.tags.join(", "),
        remote.tag_names().join(", "),
    );
    push(
        "updatedAt",
        local.updated_at.to_string(),
        remote.updated_at_ms().to_string(),
    );

    map
}

//! Typed partial updates for notes.

use crate::note::LocalNote;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when validating a patch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    /// The patch does not set any field.
    #[error("patch does not modify any field")]
    Empty,
    /// A field carries a value that is not allowed.
    #[error("invalid value for {field}: {reason}")]
    InvalidField {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// A partial update enumerating exactly the mutable note fields.
///
/// A `None` field means "leave unchanged". Identity, ownership, and sync
/// bookkeeping fields are deliberately absent; they are managed by the
/// store and the engine, never by callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// New summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// New tag set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl NotePatch {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.summary.is_none()
            && self.tags.is_none()
            && self.category_id.is_none()
    }

    /// Validates the patch before it is merged.
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.is_empty() {
            return Err(PatchError::Empty);
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(PatchError::InvalidField {
                    field: "title",
                    reason: "must not be blank".into(),
                });
            }
        }
        Ok(())
    }

    /// Applies the set fields over a note in place.
    ///
    /// Does not touch timestamps or sync status; callers decide those.
    pub fn apply_to(&self, note: &mut LocalNote) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(summary) = &self.summary {
            note.summary = Some(summary.clone());
        }
        if let Some(tags) = &self.tags {
            note.tags = tags.clone();
        }
        if let Some(category_id) = &self.category_id {
            note.category_id = Some(category_id.clone());
        }
    }

    /// Captures the full mutable state of a note as a patch.
    ///
    /// Used when a resolved conflict must be re-delivered: the follow-up
    /// operation carries the complete resolved state.
    pub fn from_note(note: &LocalNote) -> Self {
        Self {
            title: Some(note.title.clone()),
            content: Some(note.content.clone()),
            summary: note.summary.clone(),
            tags: Some(note.tags.clone()),
            category_id: note.category_id.clone(),
        }
    }
}

//! # driftsync Protocol
//!
//! Data model, conflict resolution, and wire types for driftsync.
//!
//! This crate provides:
//! - The local note model with sync bookkeeping ([`LocalNote`], [`SyncStatus`])
//! - Queued sync operations ([`SyncOperation`], [`NotePatch`])
//! - The remote entity shape as returned by the server ([`RemoteNote`])
//! - Pure conflict detection and resolution ([`conflict`])
//! - Request/response bodies for the remote batch endpoint ([`messages`])
//!
//! Everything here is plain data plus pure functions. Durable storage lives
//! in `driftsync_store`; queue draining and transport live in
//! `driftsync_engine`.
//!
//! ## Key Invariants
//!
//! - A note id is either server-issued, or temporary with `temp_id == Some(id)`
//! - Operations for one note are ordered by their enqueue timestamp
//! - Conflict resolution never performs I/O

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conflict;
pub mod messages;
mod note;
mod operation;
mod patch;
mod remote;
mod time;

pub use conflict::{ConflictError, ConflictInfo, ConflictStrategy, FieldDiff};
pub use messages::{
    BatchOpResult, BatchSummary, BatchSyncRequest, BatchSyncResponse, WireOperation,
};
pub use note::{is_temp_id, new_temp_id, LocalNote, NoteDraft, SyncStatus, TEMP_ID_PREFIX};
pub use operation::{OpStatus, OperationType, SyncOperation};
pub use patch::{NotePatch, PatchError};
pub use remote::{RemoteNote, RemoteTag};
pub use time::now_ms;

//! # driftsync Store
//!
//! Durable local storage for driftsync: the note table, the sync queue,
//! and process metadata, behind one snapshot-persisted state.
//!
//! This crate provides:
//! - [`LocalStore`] — indexed note/queue/metadata tables with durable commits
//! - [`SnapshotBackend`] — the persistence seam ([`FileBackend`], [`MemoryBackend`])
//! - [`ListingCache`] — bounded TTL cache over note listings
//! - [`StoreError`] — the storage error taxonomy
//!
//! ## Key Invariants
//!
//! - Every mutating call is durable before it returns; a failed commit
//!   rolls the in-memory state back and surfaces the error
//! - Batched writes commit once, all-or-nothing
//! - Secondary indexes (owner, update time, status, temp id) are updated
//!   in the same commit as the data they index
//! - Cleanup never deletes a note with unsynced changes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod error;
mod file;
mod memory;
mod store;

pub use backend::SnapshotBackend;
pub use cache::ListingCache;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use store::{LocalStore, Page, StoreOptions};

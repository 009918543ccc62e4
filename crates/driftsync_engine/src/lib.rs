//! # driftsync Engine
//!
//! Queue draining, conflict handling, and the offline facade for
//! driftsync.
//!
//! This crate provides:
//! - [`OpQueue`] — ordering, filtering, and retry bookkeeping over the
//!   store's queue
//! - [`SyncEngine`] — the drain loop: batch vs individual delivery,
//!   conflict resolution over a typed channel, temp-id remapping, and
//!   fixed-delay retry timers
//! - [`OfflineFacade`] — write-local-first entry point for UI callers
//! - [`RemoteApi`] — the transport seam ([`HttpRemote`], [`MockRemote`])
//!
//! ## Key Invariants
//!
//! - At most one drain is in flight; a second `start_sync` fails with
//!   [`SyncError::SyncInProgress`]
//! - Cancellation is cooperative: checked between operations, never
//!   aborting an in-flight request
//! - Per-operation failures are aggregated into the [`SyncReport`],
//!   never propagated out of a drain
//! - Operations for one note are delivered in enqueue order

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod facade;
mod hooks;
mod http;
mod queue;
mod remote;

pub use config::SyncConfig;
pub use engine::{OpError, SyncEngine, SyncReport};
pub use error::{SyncError, SyncResult};
pub use facade::{Connectivity, OfflineFacade, SaveOutcome, SyncStatusSummary};
pub use hooks::{ConflictDecision, ConflictRequest, SyncProgress};
pub use http::HttpRemote;
pub use queue::OpQueue;
pub use remote::{BatchOutcome, MockBatchMode, MockRemote, RemoteApi};

//! Remote API abstraction for sync delivery.

use crate::error::{SyncError, SyncResult};
use driftsync_protocol::{
    BatchOpResult, BatchSummary, BatchSyncRequest, BatchSyncResponse, NotePatch, OperationType,
    RemoteNote, RemoteTag,
};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Outcome of a batched remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// The response body, possibly covering only part of the request.
    pub response: BatchSyncResponse,
    /// True if the server hit its deadline and returned partial results.
    pub partial_timeout: bool,
}

/// The remote notes API consumed by the sync engine.
///
/// This trait abstracts the network layer, allowing different
/// implementations (HTTP, mock for testing, etc.).
#[allow(async_fn_in_trait)]
pub trait RemoteApi: Send + Sync {
    /// Creates a note; the response carries the server-issued id.
    async fn create_note(&self, data: &NotePatch) -> SyncResult<RemoteNote>;

    /// Applies a partial update to a note.
    async fn update_note(&self, id: &str, data: &NotePatch) -> SyncResult<RemoteNote>;

    /// Deletes a note by id.
    async fn delete_note(&self, id: &str) -> SyncResult<()>;

    /// Fetches current remote state, used only for conflict checks.
    ///
    /// Returns `None` if the note does not exist remotely.
    async fn fetch_note(&self, id: &str) -> SyncResult<Option<RemoteNote>>;

    /// Delivers a batch of operations in one call.
    async fn batch_sync(&self, request: &BatchSyncRequest) -> SyncResult<BatchOutcome>;
}

/// How the mock answers batched calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBatchMode {
    /// Apply every operation and answer with full results.
    #[default]
    Succeed,
    /// Fail the whole call with a retryable transport error.
    HardFail,
    /// Apply only the first `n` operations and mark the response as a
    /// partial timeout.
    PartialTimeout(usize),
}

#[derive(Debug, Default)]
struct MockState {
    notes: HashMap<String, RemoteNote>,
    next_id: u64,
    fail_next: u32,
    batch_mode: MockBatchMode,
    batch_calls: usize,
    individual_calls: usize,
}

/// An in-memory remote for testing.
///
/// Keeps a note table keyed by server id, issues `srv-N` ids for
/// creates, and records how it was called so tests can assert on the
/// delivery path taken.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Creates an empty mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds remote state for a note id.
    pub fn set_note(&self, note: RemoteNote) {
        self.state.lock().notes.insert(note.id.clone(), note);
    }

    /// Returns the remote note for an id, if any.
    pub fn note(&self, id: &str) -> Option<RemoteNote> {
        self.state.lock().notes.get(id).cloned()
    }

    /// Makes the next `n` individual calls fail with a retryable error.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// Sets the batch behaviour.
    pub fn set_batch_mode(&self, mode: MockBatchMode) {
        self.state.lock().batch_mode = mode;
    }

    /// Number of batched calls received.
    pub fn batch_calls(&self) -> usize {
        self.state.lock().batch_calls
    }

    /// Number of individual create/update/delete/fetch calls received.
    pub fn individual_calls(&self) -> usize {
        self.state.lock().individual_calls
    }

    fn check_failure(state: &mut MockState) -> SyncResult<()> {
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SyncError::transport_retryable("connection refused"));
        }
        Ok(())
    }

    fn apply_create(state: &mut MockState, data: &NotePatch) -> RemoteNote {
        state.next_id += 1;
        let id = format!("srv-{}", state.next_id);
        let note = remote_note_from_patch(&id, data);
        state.notes.insert(id, note.clone());
        note
    }

    fn apply_update(state: &mut MockState, id: &str, data: &NotePatch) -> SyncResult<RemoteNote> {
        let Some(existing) = state.notes.get_mut(id) else {
            return Err(SyncError::NotFound(format!("note {id}")));
        };
        if let Some(title) = &data.title {
            existing.title = title.clone();
        }
        if let Some(content) = &data.content {
            existing.content = content.clone();
        }
        if let Some(summary) = &data.summary {
            existing.summary = Some(summary.clone());
        }
        if let Some(tags) = &data.tags {
            existing.tags = tags
                .iter()
                .map(|name| RemoteTag {
                    id: None,
                    name: name.clone(),
                })
                .collect();
        }
        if let Some(category_id) = &data.category_id {
            existing.category_id = Some(category_id.clone());
        }
        existing.updated_at = iso_now();
        Ok(existing.clone())
    }
}

impl RemoteApi for MockRemote {
    async fn create_note(&self, data: &NotePatch) -> SyncResult<RemoteNote> {
        let mut state = self.state.lock();
        state.individual_calls += 1;
        Self::check_failure(&mut state)?;
        Ok(Self::apply_create(&mut state, data))
    }

    async fn update_note(&self, id: &str, data: &NotePatch) -> SyncResult<RemoteNote> {
        let mut state = self.state.lock();
        state.individual_calls += 1;
        Self::check_failure(&mut state)?;
        Self::apply_update(&mut state, id, data)
    }

    async fn delete_note(&self, id: &str) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.individual_calls += 1;
        Self::check_failure(&mut state)?;
        state.notes.remove(id);
        Ok(())
    }

    async fn fetch_note(&self, id: &str) -> SyncResult<Option<RemoteNote>> {
        let mut state = self.state.lock();
        state.individual_calls += 1;
        Self::check_failure(&mut state)?;
        Ok(state.notes.get(id).cloned())
    }

    async fn batch_sync(&self, request: &BatchSyncRequest) -> SyncResult<BatchOutcome> {
        let mut state = self.state.lock();
        state.batch_calls += 1;

        let mode = state.batch_mode;
        let cutoff = match mode {
            MockBatchMode::Succeed => request.operations.len(),
            MockBatchMode::HardFail => {
                return Err(SyncError::transport_retryable("batch endpoint unreachable"))
            }
            MockBatchMode::PartialTimeout(n) => n.min(request.operations.len()),
        };

        let mut results = Vec::new();
        // Temp ids created earlier in this batch resolve for later
        // operations, as the server does.
        let mut issued: HashMap<String, String> = HashMap::new();
        for wire in request.operations.iter().take(cutoff) {
            let target = issued
                .get(&wire.note_id)
                .cloned()
                .unwrap_or_else(|| wire.note_id.clone());
            let result = match wire.op_type {
                OperationType::Create => {
                    let created = Self::apply_create(&mut state, &wire.data);
                    if let Some(temp) = &wire.temp_id {
                        issued.insert(temp.clone(), created.id.clone());
                    }
                    BatchOpResult {
                        op_id: wire.id,
                        success: true,
                        note_id: Some(created.id),
                        error: None,
                    }
                }
                OperationType::Update => match Self::apply_update(&mut state, &target, &wire.data) {
                    Ok(_) => BatchOpResult {
                        op_id: wire.id,
                        success: true,
                        note_id: None,
                        error: None,
                    },
                    Err(e) => BatchOpResult {
                        op_id: wire.id,
                        success: false,
                        note_id: None,
                        error: Some(e.to_string()),
                    },
                },
                OperationType::Delete => {
                    state.notes.remove(&target);
                    BatchOpResult {
                        op_id: wire.id,
                        success: true,
                        note_id: None,
                        error: None,
                    }
                }
            };
            results.push(result);
        }

        let summary = BatchSummary {
            total: request.operations.len(),
            succeeded: results.iter().filter(|r| r.success).count(),
            failed: results.iter().filter(|r| !r.success).count(),
        };

        Ok(BatchOutcome {
            response: BatchSyncResponse { results, summary },
            partial_timeout: matches!(mode, MockBatchMode::PartialTimeout(_)),
        })
    }
}

fn remote_note_from_patch(id: &str, data: &NotePatch) -> RemoteNote {
    RemoteNote {
        id: id.to_string(),
        title: data.title.clone().unwrap_or_default(),
        content: data.content.clone().unwrap_or_default(),
        summary: data.summary.clone(),
        tags: data
            .tags
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|name| RemoteTag { id: None, name })
            .collect(),
        category_id: data.category_id.clone(),
        owner_id: "srv-owner".to_string(),
        created_at: Some(iso_now()),
        updated_at: iso_now(),
    }
}

fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

//! End-to-end scenarios over the facade, engine, and memory-backed store.

use driftsync_engine::{
    Connectivity, ConflictDecision, MockBatchMode, MockRemote, OfflineFacade, RemoteApi,
    SyncConfig, SyncEngine, SyncError,
};
use driftsync_protocol::{
    is_temp_id, ConflictStrategy, LocalNote, NoteDraft, NotePatch, RemoteNote, SyncOperation,
    SyncStatus,
};
use driftsync_store::{LocalStore, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;

fn stack(config: SyncConfig) -> (Arc<LocalStore>, Arc<SyncEngine<MockRemote>>, OfflineFacade<MockRemote>) {
    let store = Arc::new(LocalStore::open(Box::new(MemoryBackend::new())).unwrap());
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        MockRemote::new(),
        config,
    ));
    let facade = OfflineFacade::new(Arc::clone(&store), Arc::clone(&engine), Connectivity::new(false));
    (store, engine, facade)
}

fn draft(title: &str, content: &str) -> NoteDraft {
    NoteDraft {
        title: title.into(),
        content: content.into(),
        ..NoteDraft::default()
    }
}

#[tokio::test]
async fn offline_create_syncs_under_server_id() {
    let (_store, engine, facade) = stack(SyncConfig::new());

    // Saved with no network: local record under a temp id, one queued op.
    let saved = facade.save_note(draft("A", "x"), "user-1").unwrap();
    assert!(is_temp_id(&saved.note_id));
    assert_eq!(facade.get_sync_status().unwrap().pending_operations, 1);

    let report = facade.sync_now().await.unwrap();
    assert_eq!(report.success, 1);
    assert_eq!(report.failed, 0);

    // The note now lives under the server id; the temp id resolves to
    // nothing and the queue is empty.
    let synced = facade.get_note("srv-1").unwrap().unwrap();
    assert_eq!(synced.title, "A");
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert!(synced.identity_is_consistent());
    assert!(facade.get_note(&saved.note_id).unwrap().is_none());
    assert_eq!(facade.get_sync_status().unwrap().pending_operations, 0);
    assert!(engine.remote().note("srv-1").is_some());
}

#[tokio::test]
async fn conflicted_update_resolves_use_local_and_converges() {
    let (store, engine, _facade) = stack(SyncConfig::new());

    // Local replica modified at t=1000; the server still holds epoch 0.
    let mut note = LocalNote::from_draft(draft("local title", "local body"), "user-1");
    note.adopt_server_id("srv-1");
    note.sync_status = SyncStatus::Pending;
    note.updated_at = 1000;
    store.put(note).unwrap();
    engine.remote().set_note(RemoteNote {
        id: "srv-1".into(),
        title: "remote title".into(),
        content: "remote body".into(),
        summary: None,
        tags: vec![],
        category_id: None,
        owner_id: "user-1".into(),
        created_at: None,
        updated_at: "1970-01-01T00:00:00.000Z".into(),
    });
    engine
        .queue()
        .enqueue(SyncOperation::update(
            "srv-1",
            NotePatch {
                title: Some("local title".into()),
                ..NotePatch::default()
            },
        ))
        .unwrap();

    let mut conflicts = engine.conflict_requests();
    let responder = tokio::spawn(async move {
        let request = conflicts.recv().await.expect("conflict surfaced");
        assert_eq!(request.info.local.updated_at, 1000);
        assert_eq!(request.info.remote.title, "remote title");
        assert!(request.info.conflict_fields.contains(&"title".to_string()));
        request
            .reply
            .send(ConflictDecision {
                strategy: ConflictStrategy::UseLocal,
                merged: None,
            })
            .unwrap();
    });

    let report = engine.start_sync().await.unwrap();
    responder.await.unwrap();

    // The original op deferred to a follow-up which then delivered.
    assert_eq!(report.total, 2);
    assert_eq!(report.success, 1);
    assert_eq!(report.failed, 0);
    assert!(!engine.queue().has_pending().unwrap());

    let local = store.get("srv-1").unwrap().unwrap();
    assert!(local.updated_at > 1000);
    assert_eq!(local.sync_status, SyncStatus::Synced);
    assert_eq!(engine.remote().note("srv-1").unwrap().title, "local title");
}

#[tokio::test]
async fn conflicted_update_resolves_use_remote_without_follow_up() {
    let (store, engine, _facade) = stack(SyncConfig::new());

    let mut note = LocalNote::from_draft(draft("mine", "mine"), "user-1");
    note.adopt_server_id("srv-1");
    note.updated_at = 5000;
    store.put(note).unwrap();
    engine.remote().set_note(RemoteNote {
        id: "srv-1".into(),
        title: "theirs".into(),
        content: "theirs".into(),
        summary: None,
        tags: vec![],
        category_id: None,
        owner_id: "user-1".into(),
        created_at: None,
        updated_at: "1970-01-01T00:00:01.000Z".into(),
    });
    engine
        .queue()
        .enqueue(SyncOperation::update(
            "srv-1",
            NotePatch {
                title: Some("mine".into()),
                ..NotePatch::default()
            },
        ))
        .unwrap();

    let mut conflicts = engine.conflict_requests();
    let responder = tokio::spawn(async move {
        let request = conflicts.recv().await.unwrap();
        request
            .reply
            .send(ConflictDecision {
                strategy: ConflictStrategy::UseRemote,
                merged: None,
            })
            .unwrap();
    });

    let report = engine.start_sync().await.unwrap();
    responder.await.unwrap();

    assert_eq!(report.total, 1);
    assert!(!engine.queue().has_pending().unwrap());
    let local = store.get("srv-1").unwrap().unwrap();
    assert_eq!(local.title, "theirs");
    assert_eq!(local.sync_status, SyncStatus::Synced);
    assert_eq!(local.updated_at, 1000);
}

#[tokio::test]
async fn conflict_without_handler_fails_and_retries() {
    let (store, engine, _facade) = stack(SyncConfig::new().with_retry_delay(Duration::from_millis(10)));

    let mut note = LocalNote::from_draft(draft("mine", "mine"), "user-1");
    note.adopt_server_id("srv-1");
    note.updated_at = 1000;
    store.put(note).unwrap();
    engine.remote().set_note(RemoteNote {
        id: "srv-1".into(),
        title: "theirs".into(),
        content: "theirs".into(),
        summary: None,
        tags: vec![],
        category_id: None,
        owner_id: "user-1".into(),
        created_at: None,
        updated_at: "1970-01-01T00:00:00.000Z".into(),
    });
    engine
        .queue()
        .enqueue(SyncOperation::update("srv-1", NotePatch::default()))
        .unwrap();

    let report = engine.start_sync().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].message.contains("conflict"));

    // Failure requiring retry, not silence: the op becomes pending again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.queue().has_pending().unwrap());
}

#[tokio::test]
async fn large_queue_takes_the_batch_path() {
    let (_store, engine, facade) = stack(SyncConfig::new().with_batch_threshold(10));

    for i in 0..25 {
        facade
            .save_note(draft(&format!("note {i}"), "x"), "user-1")
            .unwrap();
    }

    let report = facade.sync_now().await.unwrap();
    assert_eq!(report.success, 25);
    assert!(engine.remote().batch_calls() >= 1);
    assert_eq!(engine.remote().individual_calls(), 0);

    assert_eq!(facade.get_sync_status().unwrap().pending_operations, 0);
    let notes = facade.get_all_notes("user-1").unwrap();
    assert_eq!(notes.len(), 25);
    assert!(notes.iter().all(|n| n.id.starts_with("srv-")));
    assert!(notes.iter().all(|n| n.sync_status == SyncStatus::Synced));
}

#[tokio::test]
async fn hard_batch_failure_falls_back_to_individual_delivery() {
    let (_store, engine, facade) = stack(SyncConfig::new().with_batch_threshold(5));
    engine.remote().set_batch_mode(MockBatchMode::HardFail);

    for i in 0..6 {
        facade
            .save_note(draft(&format!("n{i}"), "x"), "user-1")
            .unwrap();
    }

    let report = facade.sync_now().await.unwrap();
    // Same per-operation classification as running individually from
    // the start: everything succeeds.
    assert_eq!(report.success, 6);
    assert_eq!(report.failed, 0);
    assert!(engine.remote().batch_calls() >= 1);
    assert!(engine.remote().individual_calls() >= 6);
    assert_eq!(facade.get_sync_status().unwrap().pending_operations, 0);
}

#[tokio::test]
async fn partial_batch_timeout_finishes_the_rest_individually() {
    let (_store, engine, facade) = stack(SyncConfig::new().with_batch_threshold(5));
    engine.remote().set_batch_mode(MockBatchMode::PartialTimeout(3));

    for i in 0..8 {
        facade
            .save_note(draft(&format!("n{i}"), "x"), "user-1")
            .unwrap();
    }

    let report = facade.sync_now().await.unwrap();
    assert_eq!(report.success, 8);
    assert_eq!(report.failed, 0);
    // Three applied by the timed-out batch, five delivered one by one.
    assert!(engine.remote().individual_calls() >= 5);
    assert_eq!(facade.get_sync_status().unwrap().pending_operations, 0);
}

/// A remote whose creates take long enough to observe a drain mid-flight.
struct SlowRemote(MockRemote);

impl RemoteApi for SlowRemote {
    async fn create_note(&self, data: &NotePatch) -> driftsync_engine::SyncResult<RemoteNote> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.0.create_note(data).await
    }
    async fn update_note(
        &self,
        id: &str,
        data: &NotePatch,
    ) -> driftsync_engine::SyncResult<RemoteNote> {
        self.0.update_note(id, data).await
    }
    async fn delete_note(&self, id: &str) -> driftsync_engine::SyncResult<()> {
        self.0.delete_note(id).await
    }
    async fn fetch_note(&self, id: &str) -> driftsync_engine::SyncResult<Option<RemoteNote>> {
        self.0.fetch_note(id).await
    }
    async fn batch_sync(
        &self,
        request: &driftsync_protocol::BatchSyncRequest,
    ) -> driftsync_engine::SyncResult<driftsync_engine::BatchOutcome> {
        self.0.batch_sync(request).await
    }
}

fn enqueue_slow_create(store: &Arc<LocalStore>, engine: &SyncEngine<SlowRemote>, title: &str) {
    let note = LocalNote::from_draft(draft(title, "x"), "user-1");
    store.put(note.clone()).unwrap();
    engine
        .queue()
        .enqueue(SyncOperation::create(
            note.id.clone(),
            note.temp_id.clone(),
            NotePatch::from_note(&note),
        ))
        .unwrap();
}

#[tokio::test]
async fn concurrent_start_sync_is_rejected() {
    let store = Arc::new(LocalStore::open(Box::new(MemoryBackend::new())).unwrap());
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        SlowRemote(MockRemote::new()),
        SyncConfig::new(),
    ));

    enqueue_slow_create(&store, &engine, "slow");

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.start_sync().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(engine.is_sync_in_progress());
    let second = engine.start_sync().await;
    assert!(matches!(second, Err(SyncError::SyncInProgress)));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.success, 1);
    assert!(!engine.is_sync_in_progress());
}

#[tokio::test]
async fn stop_sync_halts_between_operations() {
    let store = Arc::new(LocalStore::open(Box::new(MemoryBackend::new())).unwrap());
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        SlowRemote(MockRemote::new()),
        SyncConfig::new(),
    ));
    for i in 0..3 {
        enqueue_slow_create(&store, &engine, &format!("n{i}"));
    }

    let drain = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.start_sync().await })
    };
    // Cancel while the first create is in flight: that request is not
    // aborted, but the drain stops before the second.
    tokio::time::sleep(Duration::from_millis(30)).await;
    engine.stop_sync();

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.success, 1);
    assert_eq!(engine.queue().count(None).unwrap(), 2);
    assert!(!engine.is_sync_in_progress());
}

#[tokio::test]
async fn edit_while_offline_then_sync_applies_both() {
    let (_store, engine, facade) = stack(SyncConfig::new());

    let saved = facade.save_note(draft("v1", "x"), "user-1").unwrap();
    facade
        .update_note(
            &saved.note_id,
            NotePatch {
                title: Some("v2".into()),
                ..NotePatch::default()
            },
            "user-1",
        )
        .unwrap();

    let report = facade.sync_now().await.unwrap();
    assert_eq!(report.success, 2);

    let synced = facade.get_note("srv-1").unwrap().unwrap();
    assert_eq!(synced.title, "v2");
    assert_eq!(engine.remote().note("srv-1").unwrap().title, "v2");
}

//! End-to-end engine tests against a mock remote.
//!
//! The mock serves the per-kind ingestion endpoints with canned behavior:
//! measurements accept, calibrations conflict unless the force-overwrite
//! marker is present, feedback always fails, user-actions accept slowly.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::watch;

use biolink_core::{
    ConflictResolution, NetworkMode, SyncItemKind, SyncPriority, SyncStatus,
};
use biolink_store::{Store, StoreConfig};
use biolink_sync::{
    EngineSettings, EnqueueOptions, RemoteClient, RemoteSettings, SyncEngine, SyncEventBus,
    FORCE_OVERWRITE_HEADER, ITEM_ID_HEADER,
};

// =============================================================================
// Mock Remote
// =============================================================================

#[derive(Clone, Default)]
struct MockState {
    /// Item ids in arrival order, across all accepting endpoints.
    received_ids: Arc<Mutex<Vec<String>>>,
    /// POSTs seen by the always-failing feedback endpoint.
    feedback_posts: Arc<AtomicUsize>,
}

struct MockRemote {
    addr: SocketAddr,
    state: MockState,
}

impl MockRemote {
    fn received_ids(&self) -> Vec<String> {
        self.state.received_ids.lock().unwrap().clone()
    }

    fn feedback_posts(&self) -> usize {
        self.state.feedback_posts.load(Ordering::SeqCst)
    }
}

fn record_id(state: &MockState, headers: &HeaderMap) {
    if let Some(id) = headers.get(ITEM_ID_HEADER).and_then(|v| v.to_str().ok()) {
        state.received_ids.lock().unwrap().push(id.to_string());
    }
}

async fn measurements(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record_id(&state, &headers);
    (StatusCode::OK, Json(json!({ "accepted": true })))
}

async fn calibrations(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers.contains_key(FORCE_OVERWRITE_HEADER) {
        record_id(&state, &headers);
        (StatusCode::OK, Json(json!({ "accepted": true, "overwritten": true })))
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({ "remoteValue": 6.1, "remoteVersion": 3 })),
        )
    }
}

async fn feedback(
    State(state): State<MockState>,
    _headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.feedback_posts.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "ingest down" })))
}

async fn user_actions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    tokio::time::sleep(Duration::from_millis(200)).await;
    record_id(&state, &headers);
    (StatusCode::OK, Json(json!({ "accepted": true })))
}

async fn spawn_mock_remote() -> MockRemote {
    let state = MockState::default();
    let app = Router::new()
        .route("/measurements", post(measurements))
        .route("/calibrations", post(calibrations))
        .route("/feedback", post(feedback))
        .route("/user-actions", post(user_actions))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockRemote { addr, state }
}

// =============================================================================
// Engine Fixture
// =============================================================================

async fn engine_fixture(
    remote: &MockRemote,
    settings: EngineSettings,
    initial_mode: NetworkMode,
) -> (Arc<SyncEngine>, Store, watch::Sender<NetworkMode>) {
    let store = Store::open(StoreConfig::in_memory()).await.unwrap();
    let client = RemoteClient::new(&RemoteSettings {
        base_url: Some(format!("http://{}", remote.addr)),
        auth_token: None,
        request_timeout_secs: 5,
    })
    .unwrap();

    let (mode_tx, mode_rx) = watch::channel(initial_mode);
    let engine = SyncEngine::new(&store, client, settings, SyncEventBus::new(), mode_rx);
    (engine, store, mode_tx)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn round_trip_reaches_synced_and_grace_removes_it() {
    let remote = spawn_mock_remote().await;
    let (engine, store, _mode_tx) = engine_fixture(
        &remote,
        EngineSettings {
            grace_secs: 0,
            ..Default::default()
        },
        NetworkMode::Cloud,
    )
    .await;

    let item = engine
        .enqueue(
            SyncItemKind::Measurement,
            json!({"glucose": 5.4}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let report = engine.sync().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.conflicts, 0);

    // Zero-second grace: the deferred delete removes the item promptly.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.queue().get(&item.id).await.unwrap().is_none());

    assert_eq!(remote.received_ids(), vec![item.id]);
}

#[tokio::test]
async fn conflict_round_trip_with_keep_local() {
    let remote = spawn_mock_remote().await;
    let (engine, store, _mode_tx) =
        engine_fixture(&remote, EngineSettings::default(), NetworkMode::Cloud).await;

    let item = engine
        .enqueue(
            SyncItemKind::Calibration,
            json!({"referenceValue": 5.5}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    // First pass: remote answers 409, item parks in conflict with the
    // remote's view attached.
    let report = engine.sync().await.unwrap();
    assert_eq!(report.conflicts, 1);

    let conflicted = store.queue().get(&item.id).await.unwrap().unwrap();
    assert_eq!(conflicted.status, SyncStatus::Conflict);
    assert_eq!(
        conflicted.remote_response,
        Some(json!({ "remoteValue": 6.1, "remoteVersion": 3 }))
    );

    // Keep-local: back to pending with the overwrite marker, and the
    // resolution itself drives the immediate re-send.
    engine
        .resolve_conflict(ConflictResolution::keep_local(&item.id))
        .await
        .unwrap();

    let resolved = store.queue().get(&item.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, SyncStatus::Synced);
    assert!(remote.received_ids().contains(&item.id));
}

#[tokio::test]
async fn retry_ceiling_stops_auto_retry() {
    let remote = spawn_mock_remote().await;
    let (engine, store, _mode_tx) = engine_fixture(
        &remote,
        EngineSettings {
            max_attempts: 3,
            ..Default::default()
        },
        NetworkMode::Cloud,
    )
    .await;

    let item = engine
        .enqueue(SyncItemKind::Feedback, json!({"rating": 1}), EnqueueOptions::default())
        .await
        .unwrap();

    // Each pass burns one attempt; failed items below the ceiling are
    // re-queued for the next pass.
    for expected_attempts in 1..=3u32 {
        let report = engine.sync().await.unwrap();
        assert_eq!(report.failed, 1);
        let current = store.queue().get(&item.id).await.unwrap().unwrap();
        assert_eq!(current.attempts, expected_attempts);
    }

    // At the ceiling the item stays failed and passes stop touching it.
    for _ in 0..2 {
        let report = engine.sync().await.unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.synced, 0);
    }

    let exhausted = store.queue().get(&item.id).await.unwrap().unwrap();
    assert_eq!(exhausted.status, SyncStatus::Failed);
    assert_eq!(exhausted.attempts, 3);
    assert!(exhausted.last_error.is_some());
    // Exactly 3 POSTs ever reached the remote - no automatic 4th.
    assert_eq!(remote.feedback_posts(), 3);
}

#[tokio::test]
async fn concurrent_sync_calls_do_not_double_process() {
    let remote = spawn_mock_remote().await;
    let (engine, store, _mode_tx) =
        engine_fixture(&remote, EngineSettings::default(), NetworkMode::Cloud).await;

    // The slow endpoint keeps the first pass busy long enough for the
    // second call to observe it running.
    let item = engine
        .enqueue(
            SyncItemKind::UserAction,
            json!({"action": "tap"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let (a, b) = tokio::join!(engine.sync(), engine.sync());
    let (a, b) = (a.unwrap(), b.unwrap());

    // One pass did the work, the other reported a no-op.
    let mut reports = [a, b];
    reports.sort_by_key(|r| r.total());
    assert_eq!(reports[0].total(), 0);
    assert_eq!(reports[1].synced, 1);

    // The item was sent exactly once.
    assert_eq!(remote.received_ids(), vec![item.id.clone()]);
    let synced = store.queue().get(&item.id).await.unwrap().unwrap();
    assert_eq!(synced.attempts, 1);
}

#[tokio::test]
async fn drain_order_is_priority_then_age() {
    let remote = spawn_mock_remote().await;
    let (engine, _store, _mode_tx) =
        engine_fixture(&remote, EngineSettings::default(), NetworkMode::Cloud).await;

    let older_normal = engine
        .enqueue(
            SyncItemKind::Measurement,
            json!({"seq": 1}),
            EnqueueOptions::priority(SyncPriority::Normal),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer_normal = engine
        .enqueue(
            SyncItemKind::Measurement,
            json!({"seq": 2}),
            EnqueueOptions::priority(SyncPriority::Normal),
        )
        .await
        .unwrap();
    let high = engine
        .enqueue(
            SyncItemKind::Measurement,
            json!({"seq": 3}),
            EnqueueOptions::priority(SyncPriority::High),
        )
        .await
        .unwrap();

    engine.sync().await.unwrap();

    assert_eq!(
        remote.received_ids(),
        vec![high.id, older_normal.id, newer_normal.id]
    );
}

#[tokio::test]
async fn critical_enqueue_sends_immediately_when_online() {
    let remote = spawn_mock_remote().await;
    let (engine, store, _mode_tx) =
        engine_fixture(&remote, EngineSettings::default(), NetworkMode::Cloud).await;

    // No sync() call anywhere in this test.
    let item = engine
        .enqueue(
            SyncItemKind::Measurement,
            json!({"glucose": 2.1, "alarm": "hypo"}),
            EnqueueOptions::priority(SyncPriority::Critical),
        )
        .await
        .unwrap();

    assert_eq!(item.status, SyncStatus::Synced);
    assert_eq!(item.attempts, 1);
    assert_eq!(remote.received_ids(), vec![item.id.clone()]);

    // Still durably recorded until the grace window elapses.
    let stored = store.queue().get(&item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Synced);
}

#[tokio::test]
async fn offline_to_online_transition_triggers_a_pass() {
    let remote = spawn_mock_remote().await;
    let (engine, store, mode_tx) = engine_fixture(
        &remote,
        EngineSettings {
            // Keep the timer out of the picture; only the transition may fire.
            sync_interval_secs: 3600,
            ..Default::default()
        },
        NetworkMode::Offline,
    )
    .await;
    let handle = engine.spawn();

    let item = engine
        .enqueue(
            SyncItemKind::Measurement,
            json!({"glucose": 5.0}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    // Offline: nothing moves.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        store.queue().get(&item.id).await.unwrap().unwrap().status,
        SyncStatus::Pending
    );

    // Coming back online drains the queue without any manual call.
    mode_tx.send(NetworkMode::Cloud).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let status = store.queue().get(&item.id).await.unwrap().unwrap().status;
        if status == SyncStatus::Synced {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "item never synced after reconnect (status: {status})"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    handle.shutdown().await;
}

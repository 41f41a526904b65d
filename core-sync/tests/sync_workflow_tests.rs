//! Integration tests for the sync workflow
//!
//! These tests drive full compare → plan → apply runs against in-memory
//! collections and verify:
//! - Mirroring adds, updates and deletes
//! - Idempotent re-runs
//! - Dry runs leave target untouched
//! - Deletes wait for every add and update
//! - Bounded worker pool and chunk-bounded memory
//! - Retry with backoff, per-item failure isolation
//! - Listing failures and cancellation

mod common;

use bridge_traits::{FixedClock, MediaItem};
use chrono::{TimeZone, Utc};
use common::{photo, Fault, FlowGauge, MemoryCollection, Op};
use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
use core_sync::{
    compare, sync, ActionError, ActionKind, ActionStatus, NoopProgress, ProgressSink, RunStatus, SyncAction,
    SyncError, SyncOptions, SyncOrchestrator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

fn collections(
    source: Vec<MediaItem>,
    target: Vec<MediaItem>,
) -> (Arc<MemoryCollection>, Arc<MemoryCollection>) {
    (
        Arc::new(MemoryCollection::new("source", source)),
        Arc::new(MemoryCollection::new("target", target)),
    )
}

fn fast_options() -> SyncOptions {
    SyncOptions::default()
        .with_chunk_size(1024)
        .with_base_backoff(Duration::from_millis(10))
}

/// Records which items started and finished.
#[derive(Default)]
struct RecordingProgress {
    started: Mutex<Vec<String>>,
    done: Mutex<Vec<(String, ActionStatus)>>,
    failures: Mutex<Vec<(String, bridge_traits::ErrorKind)>>,
    chunks: AtomicUsize,
}

impl ProgressSink for RecordingProgress {
    fn on_item_start(&self, action: &SyncAction) {
        self.started.lock().unwrap().push(action.item.id.clone());
    }

    fn on_chunk(&self, _item_id: &str, _bytes_so_far: u64, _total_bytes: Option<u64>) {
        self.chunks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_action_failed(&self, action: &SyncAction, error: &ActionError) {
        self.failures
            .lock()
            .unwrap()
            .push((action.item.id.clone(), error.kind));
    }

    fn on_item_done(&self, action: &SyncAction) {
        self.done
            .lock()
            .unwrap()
            .push((action.item.id.clone(), action.status));
    }
}

/// Cancels the run once the first action resolves.
struct CancelAfterFirst {
    token: CancellationToken,
}

impl ProgressSink for CancelAfterFirst {
    fn on_item_done(&self, _action: &SyncAction) {
        self.token.cancel();
    }
}

/// Cancels the run as soon as the first chunk is handed to the target.
struct CancelOnFirstChunk {
    token: CancellationToken,
}

impl ProgressSink for CancelOnFirstChunk {
    fn on_chunk(&self, _item_id: &str, _bytes_so_far: u64, _total_bytes: Option<u64>) {
        self.token.cancel();
    }
}

// ============================================================================
// Mirroring
// ============================================================================

#[tokio::test]
async fn test_sync_adds_missing_and_deletes_extra() {
    let (source, target) = collections(
        vec![photo("A"), photo("B"), photo("C")],
        vec![photo("B"), photo("D")],
    );

    let result = sync(
        source.clone(),
        target.clone(),
        fast_options(),
        Arc::new(NoopProgress),
    )
    .await
    .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.added, 2);
    assert_eq!(result.updated, 0);
    assert_eq!(result.deleted, 1);
    assert!(result.failed.is_empty());
    assert!(!result.dry_run);
    assert_eq!(target.ids(), vec!["A", "B", "C"]);
    assert_eq!(target.received_bytes("A"), Some(4096));
    assert_eq!(result.bytes_transferred, 2 * 4096);
}

#[tokio::test]
async fn test_second_run_is_empty() {
    let (source, target) = collections(
        vec![photo("A"), photo("B"), photo("C")],
        vec![photo("B"), photo("D")],
    );
    sync(source.clone(), target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    let comparison = compare(source.as_ref(), target.as_ref()).await.unwrap();
    assert!(comparison.is_in_sync());
    assert_eq!(comparison.identical_count, 3);
    assert_eq!(comparison.source_account, "source");
    assert_eq!(comparison.target_account, "target");

    let uploads_before = target.calls_of(Op::Upload).len();
    let again = sync(source.clone(), target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();
    assert_eq!((again.added, again.updated, again.deleted), (0, 0, 0));
    assert!(again.failed.is_empty());
    assert!(again.actions.is_empty());
    assert_eq!(target.calls_of(Op::Upload).len(), uploads_before);
}

#[tokio::test]
async fn test_metadata_drift_is_updated_in_place() {
    let mut favorite = photo("B");
    favorite.metadata.is_favorite = true;
    let (source, target) = collections(vec![favorite.clone()], vec![photo("B")]);

    let result = sync(source.clone(), target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!((result.added, result.updated, result.deleted), (0, 1, 0));
    assert!(target.calls_of(Op::Delete).is_empty());
    assert_eq!(target.item("B").unwrap().fingerprint(), favorite.fingerprint());
}

#[tokio::test]
async fn test_empty_source_deletes_everything() {
    let (source, target) = collections(vec![], vec![photo("X"), photo("Y")]);

    let result = sync(source, target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.deleted, 2);
    assert!(target.ids().is_empty());
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_permanent_failure_is_recorded_and_batch_continues() {
    let (source, target) = collections(vec![photo("A"), photo("B"), photo("C")], vec![]);
    target.inject(
        Op::Upload,
        Some("C"),
        Fault::Permanent("unsupported media type"),
        1,
    );

    let result = sync(source, target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.added, 2);
    assert_eq!(result.failed.len(), 1);
    let failed = &result.failed[0];
    assert_eq!(failed.item.id, "C");
    assert_eq!(failed.kind, ActionKind::Add);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.kind, bridge_traits::ErrorKind::Permanent);
    assert_eq!(error.attempts, 1);
    assert!(!result.is_success());
    assert_eq!(target.ids(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_failed_action_is_reported_to_progress() {
    let (source, target) = collections(vec![photo("A"), photo("B")], vec![]);
    target.inject(Op::Upload, Some("B"), Fault::Auth, 1);

    let progress = Arc::new(RecordingProgress::default());
    let result = sync(source, target, fast_options(), progress.clone())
        .await
        .unwrap();

    assert_eq!(result.added, 1);
    assert_eq!(
        *progress.failures.lock().unwrap(),
        vec![("B".to_string(), bridge_traits::ErrorKind::Auth)]
    );
    let done = progress.done.lock().unwrap();
    assert!(done.contains(&("B".to_string(), ActionStatus::Failed)));
    assert!(done.contains(&("A".to_string(), ActionStatus::Succeeded)));
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_item() {
    let (source, target) = collections(vec![photo("A"), photo("B")], vec![]);
    target.inject(Op::Upload, Some("A"), Fault::Transient, 10);

    let options = fast_options().with_max_retries(2);
    let result = sync(source, target.clone(), options, Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.added, 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].attempts, 3);
    assert_eq!(target.calls_of(Op::Upload).iter().filter(|c| c.id.as_deref() == Some("A")).count(), 3);
}

#[tokio::test]
async fn test_failed_delete_is_reported() {
    let (source, target) = collections(vec![], vec![photo("X"), photo("Y")]);
    target.inject(Op::Delete, Some("X"), Fault::Permanent("locked"), 1);

    let result = sync(source, target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.deleted, 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].kind, ActionKind::Delete);
    assert_eq!(target.ids(), vec!["X"]);
}

// ============================================================================
// Retry and backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limited_upload_retries_with_growing_delays() {
    let (source, target) = collections(vec![photo("A")], vec![]);
    target.inject(Op::Upload, Some("A"), Fault::RateLimited(None), 2);

    let options = SyncOptions::default()
        .with_chunk_size(1024)
        .with_base_backoff(Duration::from_millis(100));
    let result = sync(source, target.clone(), options, Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.added, 1);
    assert_eq!(result.actions[0].attempts, 3);

    let attempts = target.calls_of(Op::Upload);
    assert_eq!(attempts.len(), 3);
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert!(gaps[0] >= Duration::from_millis(100));
    assert!(gaps[1] >= gaps[0]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_honored() {
    let (source, target) = collections(vec![photo("A")], vec![]);
    target.inject(
        Op::Upload,
        Some("A"),
        Fault::RateLimited(Some(Duration::from_secs(5))),
        1,
    );

    let result = sync(source, target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.added, 1);
    let attempts = target.calls_of(Op::Upload);
    assert!(attempts[1].at - attempts[0].at >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_transient_listing_failure_is_retried() {
    let (source, target) = collections(vec![photo("A"), photo("B"), photo("C")], vec![]);
    source.inject(Op::List, None, Fault::Transient, 1);

    let result = sync(source, target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(result.added, 3);
}

// ============================================================================
// Dry run
// ============================================================================

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let mut changed = photo("B");
    changed.metadata.description = Some("edited".to_string());
    let (source, target) = collections(
        vec![photo("A"), changed],
        vec![photo("B"), photo("D")],
    );

    let options = fast_options();
    let options = SyncOptions {
        dry_run: true,
        ..options
    };
    let result = sync(source.clone(), target.clone(), options, Arc::new(NoopProgress))
        .await
        .unwrap();

    assert!(result.dry_run);
    assert_eq!((result.added, result.updated, result.deleted), (1, 1, 1));
    assert!(result
        .actions
        .iter()
        .all(|a| a.status == ActionStatus::Pending));
    assert!(target.calls().iter().all(|c| c.op == Op::List));
    assert!(source.calls_of(Op::Download).is_empty());
    assert_eq!(target.ids(), vec!["B", "D"]);
}

// ============================================================================
// Ordering and concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deletes_start_after_all_transfers_resolve() {
    let source_items: Vec<MediaItem> = (0..8).map(|i| photo(&format!("S{i}"))).collect();
    let target_items: Vec<MediaItem> = (0..4).map(|i| photo(&format!("T{i}"))).collect();
    let source = Arc::new(MemoryCollection::new("source", source_items));
    let target = Arc::new(
        MemoryCollection::new("target", target_items).with_latency(Duration::from_millis(30)),
    );
    // One transfer fails; it must still resolve before any delete.
    target.inject(Op::Upload, Some("S3"), Fault::Permanent("corrupt"), 1);

    let result = sync(
        source,
        target.clone(),
        fast_options().with_concurrency(4),
        Arc::new(NoopProgress),
    )
    .await
    .unwrap();

    assert_eq!(result.added, 7);
    assert_eq!(result.deleted, 4);

    let last_upload = target
        .calls_of(Op::Upload)
        .iter()
        .map(|c| c.seq)
        .chain(target.upload_completions().iter().map(|(_, seq)| *seq))
        .max()
        .unwrap();
    let first_delete = target
        .calls_of(Op::Delete)
        .iter()
        .map(|c| c.seq)
        .min()
        .unwrap();
    assert!(last_upload < first_delete);
}

#[tokio::test(start_paused = true)]
async fn test_worker_pool_is_bounded() {
    let items: Vec<MediaItem> = (0..12).map(|i| photo(&format!("P{i}"))).collect();
    let source = Arc::new(MemoryCollection::new("source", items));
    let target = Arc::new(
        MemoryCollection::new("target", vec![]).with_latency(Duration::from_millis(50)),
    );

    let result = sync(
        source,
        target.clone(),
        fast_options().with_concurrency(3),
        Arc::new(NoopProgress),
    )
    .await
    .unwrap();

    assert_eq!(result.added, 12);
    assert!(target.peak_in_flight() <= 3);
    assert!(target.peak_in_flight() >= 2);
}

#[tokio::test]
async fn test_large_item_streams_in_bounded_chunks() {
    let chunk_size = 64 * 1024;
    let piece_size = 10_000;
    let gauge = Arc::new(FlowGauge::default());
    let large = MediaItem::new("big", "big.mov")
        .with_mime_type("video/quicktime")
        .with_size(32 * 1024 * 1024);

    let source = Arc::new(
        MemoryCollection::new("source", vec![large])
            .with_piece_size(piece_size)
            .with_gauge(Arc::clone(&gauge)),
    );
    let target = Arc::new(MemoryCollection::new("target", vec![]).with_gauge(Arc::clone(&gauge)));

    let progress = Arc::new(RecordingProgress::default());
    let result = sync(
        source,
        target.clone(),
        SyncOptions::default()
            .with_concurrency(1)
            .with_chunk_size(chunk_size),
        progress.clone(),
    )
    .await
    .unwrap();

    assert_eq!(result.added, 1);
    assert_eq!(target.received_bytes("big"), Some(32 * 1024 * 1024));
    assert_eq!(gauge.consumed(), 32 * 1024 * 1024);
    assert!(gauge.largest_chunk() <= chunk_size);
    assert!(gauge.peak_outstanding() <= (chunk_size + piece_size) as u64);
    assert_eq!(progress.chunks.load(Ordering::SeqCst), 512);
}

// ============================================================================
// Aborts and cancellation
// ============================================================================

#[tokio::test]
async fn test_auth_failure_during_listing_aborts_run() {
    let (source, target) = collections(vec![photo("A")], vec![photo("D")]);
    target.inject(Op::List, None, Fault::Auth, 1);

    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let orchestrator = SyncOrchestrator::new().with_event_bus(bus);
    let err = orchestrator
        .sync(source.clone(), target.clone(), fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Auth { ref account, .. } if account == "target"));
    assert!(source.calls_of(Op::Download).is_empty());
    assert!(target.calls_of(Op::Upload).is_empty());
    assert!(target.calls_of(Op::Delete).is_empty());

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Sync(SyncEvent::Failed { recoverable, .. }) = event {
            assert!(!recoverable);
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn test_invalid_options_make_no_remote_calls() {
    let (source, target) = collections(vec![photo("A")], vec![]);

    let err = sync(
        source.clone(),
        target.clone(),
        fast_options().with_concurrency(0),
        Arc::new(NoopProgress),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SyncError::Validation { .. }));
    assert!(source.calls().is_empty());
    assert!(target.calls().is_empty());
}

#[tokio::test]
async fn test_cancellation_keeps_completed_actions() {
    let items: Vec<MediaItem> = (0..5).map(|i| photo(&format!("P{i}"))).collect();
    let (source, target) = collections(items, vec![photo("OLD")]);

    let token = CancellationToken::new();
    let progress = Arc::new(CancelAfterFirst {
        token: token.clone(),
    });
    let result = SyncOrchestrator::new()
        .sync_with_cancellation(
            source,
            target.clone(),
            fast_options().with_concurrency(1),
            progress,
            token,
        )
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.added, 1);
    assert_eq!(result.deleted, 0);
    assert_eq!(result.actions.len(), 6);
    assert_eq!(result.pending_count(), 5);
    assert!(target.calls_of(Op::Delete).is_empty());
    assert!(target.ids().contains(&"OLD".to_string()));
    // Plan order survives aggregation.
    assert_eq!(result.actions.last().unwrap().kind, ActionKind::Delete);
}

#[tokio::test]
async fn test_cancellation_mid_transfer_leaves_action_pending() {
    let (source, target) = collections(vec![photo("A")], vec![]);

    let token = CancellationToken::new();
    let progress = Arc::new(CancelOnFirstChunk {
        token: token.clone(),
    });
    let result = SyncOrchestrator::new()
        .sync_with_cancellation(
            source,
            target.clone(),
            fast_options().with_concurrency(1),
            progress,
            token,
        )
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.added, 0);
    assert!(result.failed.is_empty());
    let action = &result.actions[0];
    assert_eq!(action.status, ActionStatus::Pending);
    assert_eq!(action.attempts, 1);
    assert!(action.error.is_none());
    // The upload was entered once and never retried.
    assert_eq!(target.calls_of(Op::Upload).len(), 1);
    assert!(target.ids().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_returns_error() {
    let (source, target) = collections(vec![photo("A")], vec![]);
    let token = CancellationToken::new();
    token.cancel();

    let err = SyncOrchestrator::new()
        .sync_with_cancellation(
            source,
            target.clone(),
            fast_options(),
            Arc::new(NoopProgress),
            token,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert!(target.calls().is_empty());
}

// ============================================================================
// Events and reporting
// ============================================================================

#[tokio::test]
async fn test_run_emits_lifecycle_events() {
    let (source, target) = collections(vec![photo("A")], vec![photo("D")]);
    let bus = EventBus::new(64);
    let mut events =
        EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Sync(_)));
    let progress = Arc::new(RecordingProgress::default());
    let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();

    let result = SyncOrchestrator::new()
        .with_event_bus(bus)
        .with_clock(Arc::new(FixedClock(started_at)))
        .sync(source, target, fast_options(), progress.clone())
        .await
        .unwrap();
    assert_eq!(result.started_at, started_at);

    let mut names = Vec::new();
    while let Some(Ok(CoreEvent::Sync(event))) = events.try_recv() {
        names.push(match event {
            SyncEvent::Started { .. } => "started",
            SyncEvent::PhaseChanged { .. } => "phase",
            SyncEvent::Planned { adds, deletes, .. } => {
                assert_eq!((adds, deletes), (1, 1));
                "planned"
            }
            SyncEvent::Completed { .. } => "completed",
            SyncEvent::Failed { .. } => "failed",
            SyncEvent::Cancelled { .. } => "cancelled",
        });
    }
    assert_eq!(names.first(), Some(&"started"));
    assert!(names.contains(&"planned"));
    assert!(!names.contains(&"failed"));
    assert_eq!(names.last(), Some(&"completed"));

    assert_eq!(progress.started.lock().unwrap().len(), 2);
    let done = progress.done.lock().unwrap();
    assert!(done.iter().all(|(_, status)| *status == ActionStatus::Succeeded));
}

#[tokio::test]
async fn test_result_serializes_with_stable_fields() {
    let (source, target) = collections(vec![photo("A")], vec![]);
    let result = sync(source, target, fast_options(), Arc::new(NoopProgress))
        .await
        .unwrap();

    let json = result.to_json().unwrap();
    for field in [
        "run_id",
        "status",
        "dry_run",
        "added",
        "updated",
        "deleted",
        "failed",
        "elapsed_ms",
        "actions",
    ] {
        assert!(json.get(field).is_some(), "missing {field}");
    }
    assert_eq!(json["status"], "completed");
    assert_eq!(json["actions"][0]["kind"], "add");
    assert_eq!(json["actions"][0]["status"], "succeeded");
}

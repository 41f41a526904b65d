//! # Progress Reporting
//!
//! [`ProgressSink`] is the engine's only outward channel while a run is in
//! flight. Calls arrive from worker tasks concurrently, so implementations
//! must be cheap and thread-safe; every method defaults to a no-op.

use crate::plan::{ActionError, ActionStatus, SyncAction};
use crate::state::SyncPhase;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};

pub trait ProgressSink: Send + Sync {
    fn on_phase(&self, _phase: SyncPhase) {}

    /// An action was dispatched to the worker pool.
    fn on_item_start(&self, _action: &SyncAction) {}

    /// A chunk of `item_id` was handed to the target. `bytes_so_far` is
    /// cumulative for the current attempt.
    fn on_chunk(&self, _item_id: &str, _bytes_so_far: u64, _total_bytes: Option<u64>) {}

    /// An action exhausted its attempts or hit a non-retryable error.
    /// Called just before [`on_item_done`](Self::on_item_done).
    fn on_action_failed(&self, _action: &SyncAction, _error: &ActionError) {}

    /// An action resolved; inspect `action.status` for the outcome.
    fn on_item_done(&self, _action: &SyncAction) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Republishes progress as [`TransferEvent`]s on an [`EventBus`].
#[derive(Debug, Clone)]
pub struct EventBusProgress {
    bus: EventBus,
}

impl EventBusProgress {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl ProgressSink for EventBusProgress {
    fn on_item_start(&self, action: &SyncAction) {
        self.bus
            .emit(CoreEvent::Transfer(TransferEvent::ItemStarted {
                item_id: action.item.id.clone(),
                action: action.kind.as_str().to_string(),
            }))
            .ok();
    }

    fn on_chunk(&self, item_id: &str, bytes_so_far: u64, total_bytes: Option<u64>) {
        self.bus
            .emit(CoreEvent::Transfer(TransferEvent::ChunkTransferred {
                item_id: item_id.to_string(),
                bytes_transferred: bytes_so_far,
                total_bytes,
            }))
            .ok();
    }

    fn on_item_done(&self, action: &SyncAction) {
        let event = match (&action.status, &action.error) {
            (ActionStatus::Failed, Some(error)) => TransferEvent::ItemFailed {
                item_id: action.item.id.clone(),
                action: action.kind.as_str().to_string(),
                kind: error.kind.as_str().to_string(),
                message: error.message.clone(),
                attempts: error.attempts,
            },
            (ActionStatus::Succeeded, _) => TransferEvent::ItemCompleted {
                item_id: action.item.id.clone(),
                action: action.kind.as_str().to_string(),
                bytes: action.bytes_transferred,
            },
            _ => return,
        };
        self.bus.emit(CoreEvent::Transfer(event)).ok();
    }
}

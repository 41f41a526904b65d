//! # Sync Orchestrator
//!
//! Runs the compare → plan → apply pipeline that makes a target collection
//! mirror a source collection.
//!
//! ## Workflow
//!
//! 1. Validate [`SyncOptions`] (no remote call happens on invalid options)
//! 2. List source and target concurrently, exhausting pagination
//! 3. Diff the listings into missing / extra / metadata-changed
//! 4. Plan Adds, Updates and Deletes; a dry run stops here
//! 5. Apply Adds and Updates through a bounded worker pool
//! 6. Wait for all of them to resolve, then apply Deletes through the pool
//! 7. Aggregate per-action outcomes into a [`SyncResult`]
//!
//! A failed action never aborts the batch. A failed listing aborts the run
//! before anything on target is touched.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncOptions, SyncOrchestrator, NoopProgress};
//! use std::sync::Arc;
//!
//! let orchestrator = SyncOrchestrator::new();
//! let result = orchestrator
//!     .sync(source, target, SyncOptions::default(), Arc::new(NoopProgress))
//!     .await?;
//! println!("added {} updated {} deleted {}", result.added, result.updated, result.deleted);
//! ```

use crate::{
    differ::{compare_items_at, ComparisonResult},
    error::{Result, SyncError},
    lister::CollectionLister,
    plan::{ActionKind, SyncAction, SyncPlan},
    progress::ProgressSink,
    result::{RunInfo, SyncResult},
    retry::{RetryPolicy, DEFAULT_MAX_DELAY},
    state::{SyncPhase, SyncRun},
    transfer::TransferEngine,
};
use bridge_traits::{Clock, RemoteCollectionClient, SystemClock};
use core_runtime::config::{SyncSettings, MAX_CONCURRENT_TRANSFERS_LIMIT, MAX_RETRIES_LIMIT};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 8 * 1024 * 1024;
pub const MAX_CHUNK_SIZE_BYTES: usize = 256 * 1024 * 1024;

/// Per-run options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Compute and report the plan without touching target
    pub dry_run: bool,
    /// Upper bound on in-flight transfers and deletes
    pub concurrency: usize,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    pub chunk_size_bytes: usize,
    /// Delay before the first retry
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: crate::retry::DEFAULT_MAX_RETRIES,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            base_backoff: crate::retry::DEFAULT_BASE_DELAY,
            max_backoff: DEFAULT_MAX_DELAY,
        }
    }
}

impl SyncOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size_bytes = bytes;
        self
    }

    pub fn with_base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    /// Reject out-of-range values before any remote call.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENT_TRANSFERS_LIMIT {
            return Err(SyncError::validation(
                "concurrency",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_CONCURRENT_TRANSFERS_LIMIT, self.concurrency
                ),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(SyncError::validation(
                "max_retries",
                format!("must not exceed {}, got {}", MAX_RETRIES_LIMIT, self.max_retries),
            ));
        }
        if self.chunk_size_bytes == 0 || self.chunk_size_bytes > MAX_CHUNK_SIZE_BYTES {
            return Err(SyncError::validation(
                "chunk_size_bytes",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_CHUNK_SIZE_BYTES, self.chunk_size_bytes
                ),
            ));
        }
        if self.base_backoff.is_zero() || self.base_backoff > self.max_backoff {
            return Err(SyncError::validation(
                "base_backoff",
                "must be positive and not exceed max_backoff",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_backoff).with_max_delay(self.max_backoff)
    }
}

impl From<&SyncSettings> for SyncOptions {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            dry_run: settings.dry_run,
            concurrency: settings.max_concurrent_transfers,
            max_retries: settings.max_retries,
            chunk_size_bytes: settings.chunk_size_bytes(),
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
            max_backoff: DEFAULT_MAX_DELAY,
        }
    }
}

/// Composes lister, differ and transfer engine into sync runs.
pub struct SyncOrchestrator {
    event_bus: Option<EventBus>,
    clock: Arc<dyn Clock>,
}

impl Default for SyncOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncOrchestrator {
    pub fn new() -> Self {
        Self {
            event_bus: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Publish run lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }

    /// List both collections and diff them.
    pub async fn compare(
        &self,
        source: &dyn RemoteCollectionClient,
        target: &dyn RemoteCollectionClient,
    ) -> Result<ComparisonResult> {
        let lister = CollectionLister::new(RetryPolicy::default());
        self.compare_with(&lister, source, target, &CancellationToken::new())
            .await
    }

    /// Compare and plan without applying anything.
    pub async fn plan(
        &self,
        source: &dyn RemoteCollectionClient,
        target: &dyn RemoteCollectionClient,
    ) -> Result<SyncPlan> {
        let comparison = self.compare(source, target).await?;
        Ok(SyncPlan::from_comparison(&comparison))
    }

    async fn compare_with(
        &self,
        lister: &CollectionLister,
        source: &dyn RemoteCollectionClient,
        target: &dyn RemoteCollectionClient,
        cancel: &CancellationToken,
    ) -> Result<ComparisonResult> {
        let (source_items, target_items) = tokio::try_join!(
            lister.list_all(source, cancel),
            lister.list_all(target, cancel)
        )?;
        Ok(
            compare_items_at(&source_items, &target_items, self.clock.now())
                .with_accounts(source.label(), target.label()),
        )
    }

    pub async fn sync(
        &self,
        source: Arc<dyn RemoteCollectionClient>,
        target: Arc<dyn RemoteCollectionClient>,
        options: SyncOptions,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<SyncResult> {
        self.sync_with_cancellation(source, target, options, progress, CancellationToken::new())
            .await
    }

    /// Run a sync that stops dispatching new actions once `cancel` fires.
    ///
    /// Actions already finished keep their outcome, undispatched ones stay
    /// `Pending`, and the result is marked cancelled. Cancellation during
    /// comparison returns [`SyncError::Cancelled`].
    #[instrument(
        skip(self, source, target, options, progress, cancel),
        fields(source = %source.label(), target = %target.label(), dry_run = options.dry_run)
    )]
    pub async fn sync_with_cancellation(
        &self,
        source: Arc<dyn RemoteCollectionClient>,
        target: Arc<dyn RemoteCollectionClient>,
        options: SyncOptions,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<SyncResult> {
        options.validate()?;

        let started = Instant::now();
        let mut run = SyncRun::new(self.clock.now());
        let run_id = run.id.to_string();
        let (id, started_at) = (run.id, run.started_at);
        let info = |elapsed: Duration| RunInfo {
            run_id: id,
            source_account: source.label().to_string(),
            target_account: target.label().to_string(),
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
        };

        self.emit(SyncEvent::Started {
            run_id: run_id.clone(),
            source: source.label().to_string(),
            target: target.label().to_string(),
            dry_run: options.dry_run,
        });

        // Phase 1: Compare
        info!("Phase 1: Listing and comparing collections");
        self.enter(&mut run, SyncPhase::Comparing, progress.as_ref())?;
        let lister = CollectionLister::new(options.retry_policy());
        let comparison = match self
            .compare_with(&lister, source.as_ref(), target.as_ref(), &cancel)
            .await
        {
            Ok(comparison) => comparison,
            Err(SyncError::Cancelled) => {
                run.cancel(self.clock.now())?;
                progress.on_phase(SyncPhase::Cancelled);
                self.emit(SyncEvent::Cancelled {
                    run_id,
                    completed_actions: 0,
                });
                return Err(SyncError::Cancelled);
            }
            Err(err) => {
                error!(error = %err, "Comparison failed; nothing applied");
                run.fail(err.to_string(), self.clock.now())?;
                progress.on_phase(SyncPhase::Failed);
                self.emit(SyncEvent::Failed {
                    run_id,
                    message: err.to_string(),
                    recoverable: err.is_recoverable(),
                });
                return Err(err);
            }
        };

        // Phase 2: Plan
        self.enter(&mut run, SyncPhase::Planning, progress.as_ref())?;
        let plan = SyncPlan::from_comparison(&comparison);
        let planned = plan.summary();
        info!(
            adds = planned.adds,
            updates = planned.updates,
            deletes = planned.deletes,
            identical = comparison.identical_count,
            "Phase 2: Plan ready"
        );
        self.emit(SyncEvent::Planned {
            run_id: run_id.clone(),
            adds: planned.adds as u64,
            updates: planned.updates as u64,
            deletes: planned.deletes as u64,
        });

        if options.dry_run {
            self.enter(&mut run, SyncPhase::Completed, progress.as_ref())?;
            let result = SyncResult::planned_only(info(started.elapsed()), plan);
            self.emit_completed(&run_id, &result);
            info!("Dry run complete; target untouched");
            return Ok(result);
        }

        // Phase 3: Apply
        info!("Phase 3: Applying {} actions", planned.total());
        self.enter(&mut run, SyncPhase::Applying, progress.as_ref())?;

        let positions: HashMap<(ActionKind, String), usize> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| ((a.kind, a.item.id.clone()), i))
            .collect();
        let (deletes, transfers): (Vec<_>, Vec<_>) = plan
            .actions
            .into_iter()
            .partition(|a| a.kind == ActionKind::Delete);

        let engine = Arc::new(TransferEngine::new(
            Arc::clone(&source),
            Arc::clone(&target),
            options.chunk_size_bytes,
            options.retry_policy(),
            Arc::clone(&progress),
        ));
        let pool = Arc::new(Semaphore::new(options.concurrency));

        let mut batch = apply_batch(transfers, &engine, &pool, &cancel).await;
        // Deletes start only after every Add and Update has resolved.
        if batch.cancelled {
            warn!(skipped = deletes.len(), "Cancelled before deletes; skipping delete phase");
            batch.undispatched.extend(deletes);
        } else {
            let delete_batch = apply_batch(deletes, &engine, &pool, &cancel).await;
            batch.merge(delete_batch);
        }

        let cancelled = batch.cancelled;
        let mut actions = batch.into_actions();
        actions.sort_by_key(|a| {
            positions
                .get(&(a.kind, a.item.id.clone()))
                .copied()
                .unwrap_or(usize::MAX)
        });

        let result = SyncResult::applied(info(started.elapsed()), planned, actions, cancelled);

        if cancelled {
            run.cancel(self.clock.now())?;
            progress.on_phase(SyncPhase::Cancelled);
            self.emit(SyncEvent::Cancelled {
                run_id,
                completed_actions: (result.total_actions() - result.pending_count()) as u64,
            });
            info!(
                added = result.added,
                updated = result.updated,
                deleted = result.deleted,
                pending = result.pending_count(),
                "Sync cancelled"
            );
        } else {
            self.enter(&mut run, SyncPhase::Completed, progress.as_ref())?;
            self.emit_completed(&run_id, &result);
            info!(
                added = result.added,
                updated = result.updated,
                deleted = result.deleted,
                failed = result.failed_count(),
                bytes = result.bytes_transferred,
                elapsed_ms = result.elapsed_ms,
                "Sync complete"
            );
        }

        Ok(result)
    }

    fn enter(&self, run: &mut SyncRun, phase: SyncPhase, progress: &dyn ProgressSink) -> Result<()> {
        run.advance(phase, self.clock.now())?;
        progress.on_phase(phase);
        self.emit(SyncEvent::PhaseChanged {
            run_id: run.id.to_string(),
            phase: phase.as_str().to_string(),
        });
        Ok(())
    }

    fn emit_completed(&self, run_id: &str, result: &SyncResult) {
        self.emit(SyncEvent::Completed {
            run_id: run_id.to_string(),
            added: result.added as u64,
            updated: result.updated as u64,
            deleted: result.deleted as u64,
            failed: result.failed_count() as u64,
            duration_ms: result.elapsed_ms,
        });
    }
}

/// Outcome of one dispatch phase.
struct BatchOutcome {
    resolved: Vec<SyncAction>,
    undispatched: Vec<SyncAction>,
    cancelled: bool,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.resolved.extend(other.resolved);
        self.undispatched.extend(other.undispatched);
        self.cancelled |= other.cancelled;
    }

    fn into_actions(self) -> Vec<SyncAction> {
        let mut actions = self.resolved;
        actions.extend(self.undispatched);
        actions
    }
}

/// Dispatch `actions` through the pool and wait for every dispatched one to
/// resolve. A permit is taken before each spawn, so no more than the pool's
/// size run at once. Dispatch stops at the first sign of cancellation.
async fn apply_batch(
    actions: Vec<SyncAction>,
    engine: &Arc<TransferEngine>,
    pool: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> BatchOutcome {
    let mut in_flight: HashMap<String, SyncAction> = HashMap::new();
    let mut undispatched = Vec::new();
    let mut tasks = JoinSet::new();
    let mut remaining = actions.into_iter();

    for action in remaining.by_ref() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(pool).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            undispatched.push(action);
            break;
        };

        in_flight.insert(action.item.id.clone(), action.clone());
        let engine = Arc::clone(engine);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            engine.apply(action, &cancel).await
        });
    }
    undispatched.extend(remaining);

    let mut resolved = Vec::with_capacity(in_flight.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(action) => {
                in_flight.remove(&action.item.id);
                resolved.push(action);
            }
            Err(err) => error!(error = %err, "Worker task aborted"),
        }
    }

    // Anything still tracked belongs to a worker that panicked.
    for (_, mut action) in in_flight {
        action.fail(
            &bridge_traits::BridgeError::OperationFailed("worker task aborted".to_string()),
            action.attempts.max(1),
            0,
        );
        resolved.push(action);
    }

    BatchOutcome {
        resolved,
        undispatched,
        cancelled: cancel.is_cancelled(),
    }
}

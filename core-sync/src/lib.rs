//! # Collection Sync
//!
//! One-way mirroring of a source media collection onto a target collection.
//! Source always wins: missing items are added, drifted metadata is
//! re-uploaded, and items only on target are deleted.
//!
//! ## Overview
//!
//! A sync run compares, plans and applies:
//! - Lists both collections through a [`RemoteCollectionClient`]
//! - Diffs them by item id and metadata fingerprint
//! - Streams item content from source to target in fixed-size chunks
//! - Retries rate-limited and transient failures with exponential backoff
//! - Starts deletes only after every add and update has resolved
//!
//! ## Components
//!
//! - **Collection Lister** (`lister`): Exhaustive pagination with per-page retry
//! - **Differ** (`differ`): Partitions two listings into missing / extra / changed
//! - **Sync Plan** (`plan`): Ordered Add, Update and Delete actions
//! - **Transfer Engine** (`transfer`): Chunked streaming of a single action
//! - **Retry Policy** (`retry`): Backoff schedule honoring `Retry-After`
//! - **Sync Orchestrator** (`coordinator`): Runs the pipeline and aggregates a [`SyncResult`]
//! - **Run State** (`state`): Phase state machine for a run
//!
//! [`RemoteCollectionClient`]: bridge_traits::RemoteCollectionClient

pub mod coordinator;
pub mod differ;
pub mod error;
pub mod lister;
pub mod plan;
pub mod progress;
pub mod result;
pub mod retry;
pub mod state;
pub mod transfer;

pub use coordinator::{SyncOptions, SyncOrchestrator};
pub use differ::{compare_items, ComparisonResult, FieldDifference, MetadataChange};
pub use error::{Result, SyncError};
pub use lister::CollectionLister;
pub use plan::{ActionError, ActionKind, ActionStatus, PlanSummary, SyncAction, SyncPlan};
pub use progress::{EventBusProgress, NoopProgress, ProgressSink};
pub use result::{RunStatus, SyncResult};
pub use retry::RetryPolicy;
pub use state::{SyncPhase, SyncRun, SyncRunId};
pub use transfer::TransferEngine;

use bridge_traits::RemoteCollectionClient;
use std::sync::Arc;

/// Compare two collections with default settings.
pub async fn compare(
    source: &dyn RemoteCollectionClient,
    target: &dyn RemoteCollectionClient,
) -> Result<ComparisonResult> {
    SyncOrchestrator::default().compare(source, target).await
}

/// Make `target` mirror `source`.
pub async fn sync(
    source: Arc<dyn RemoteCollectionClient>,
    target: Arc<dyn RemoteCollectionClient>,
    options: SyncOptions,
    progress: Arc<dyn ProgressSink>,
) -> Result<SyncResult> {
    SyncOrchestrator::default()
        .sync(source, target, options, progress)
        .await
}

//! # Sync Result
//!
//! Auditable outcome of one sync run.

use crate::plan::{ActionKind, ActionStatus, PlanSummary, SyncAction, SyncPlan};
use crate::state::SyncRunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub run_id: SyncRunId,
    pub status: RunStatus,
    pub dry_run: bool,
    pub source_account: String,
    pub target_account: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub planned: PlanSummary,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub bytes_transferred: u64,
    /// Failed actions, in plan order
    pub failed: Vec<SyncAction>,
    /// Every planned action with its final status, in plan order
    pub actions: Vec<SyncAction>,
}

/// Identity and timing of a run, shared by every way a result is built.
#[derive(Debug, Clone)]
pub(crate) struct RunInfo {
    pub run_id: SyncRunId,
    pub source_account: String,
    pub target_account: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl SyncResult {
    /// Dry-run result: planned counts reported as if applied, nothing touched.
    pub(crate) fn planned_only(info: RunInfo, plan: SyncPlan) -> Self {
        let planned = plan.summary();
        Self {
            run_id: info.run_id,
            status: RunStatus::Completed,
            dry_run: true,
            source_account: info.source_account,
            target_account: info.target_account,
            started_at: info.started_at,
            elapsed_ms: info.elapsed_ms,
            planned,
            added: planned.adds,
            updated: planned.updates,
            deleted: planned.deletes,
            bytes_transferred: 0,
            failed: Vec::new(),
            actions: plan.actions,
        }
    }

    /// Result of an applied plan. `actions` must already be in plan order.
    pub(crate) fn applied(
        info: RunInfo,
        planned: PlanSummary,
        actions: Vec<SyncAction>,
        cancelled: bool,
    ) -> Self {
        let succeeded = |kind: ActionKind| {
            actions
                .iter()
                .filter(|a| a.kind == kind && a.status == ActionStatus::Succeeded)
                .count()
        };
        let failed: Vec<SyncAction> = actions
            .iter()
            .filter(|a| a.status == ActionStatus::Failed)
            .cloned()
            .collect();

        Self {
            run_id: info.run_id,
            status: if cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            },
            dry_run: false,
            source_account: info.source_account,
            target_account: info.target_account,
            started_at: info.started_at,
            elapsed_ms: info.elapsed_ms,
            planned,
            added: succeeded(ActionKind::Add),
            updated: succeeded(ActionKind::Update),
            deleted: succeeded(ActionKind::Delete),
            bytes_transferred: actions.iter().map(|a| a.bytes_transferred).sum(),
            failed,
            actions,
        }
    }

    pub fn total_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Actions never dispatched (dry run or cancellation).
    pub fn pending_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .count()
    }

    /// Completed with every action applied.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed && self.failed.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

//! # Sync Plan
//!
//! The ordered list of actions that makes target mirror source: every Add,
//! then every Update, then every Delete.

use crate::differ::ComparisonResult;
use bridge_traits::{BridgeError, ErrorKind, MediaItem};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Add,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Add => "add",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Why an action failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
    pub kind: ActionKind,
    /// Source item for Add/Update, target item for Delete
    pub item: MediaItem,
    pub status: ActionStatus,
    pub error: Option<ActionError>,
    pub attempts: u32,
    pub bytes_transferred: u64,
}

impl SyncAction {
    pub fn new(kind: ActionKind, item: MediaItem) -> Self {
        Self {
            kind,
            item,
            status: ActionStatus::Pending,
            error: None,
            attempts: 0,
            bytes_transferred: 0,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item.id
    }

    pub fn succeed(&mut self, attempts: u32, bytes: u64) {
        self.status = ActionStatus::Succeeded;
        self.attempts = attempts;
        self.bytes_transferred = bytes;
        self.error = None;
    }

    pub fn fail(&mut self, error: &BridgeError, attempts: u32, bytes: u64) {
        self.status = ActionStatus::Failed;
        self.attempts = attempts;
        self.bytes_transferred = bytes;
        self.error = Some(ActionError {
            kind: error.kind(),
            message: error.to_string(),
            attempts,
        });
    }
}

/// Planned action counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub adds: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl PlanSummary {
    pub fn total(&self) -> usize {
        self.adds + self.updates + self.deletes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
}

impl SyncPlan {
    /// Missing items become Adds, drifted items become in-place Updates and
    /// extra items become Deletes. Identical items produce nothing.
    pub fn from_comparison(comparison: &ComparisonResult) -> Self {
        let adds = comparison
            .missing_on_target
            .iter()
            .map(|item| SyncAction::new(ActionKind::Add, item.clone()));
        let updates = comparison
            .metadata_changed
            .iter()
            .map(|change| SyncAction::new(ActionKind::Update, change.source.clone()));
        let deletes = comparison
            .extra_on_target
            .iter()
            .map(|item| SyncAction::new(ActionKind::Delete, item.clone()));

        Self {
            actions: adds.chain(updates).chain(deletes).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        let count = |kind: ActionKind| self.actions.iter().filter(|a| a.kind == kind).count();
        PlanSummary {
            adds: count(ActionKind::Add),
            updates: count(ActionKind::Update),
            deletes: count(ActionKind::Delete),
        }
    }
}

//! # Sync Run State Machine
//!
//! Tracks the phase of one sync run and rejects out-of-order transitions.
//!
//! ```text
//! Idle → Comparing → Planning → Applying → Completed
//!   │        │           │  └──────────────────↑ (dry run / empty plan)
//!   └────────┴───────────┴──────┴──→ Failed | Cancelled
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidRunId(e.to_string()))?,
        ))
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The phase a sync run is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Comparing,
    Planning,
    Applying,
    Completed,
    Failed,
    Cancelled,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Completed | SyncPhase::Failed | SyncPhase::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Comparing => "comparing",
            SyncPhase::Planning => "planning",
            SyncPhase::Applying => "applying",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
            SyncPhase::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SyncPhase {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncPhase::Idle),
            "comparing" => Ok(SyncPhase::Comparing),
            "planning" => Ok(SyncPhase::Planning),
            "applying" => Ok(SyncPhase::Applying),
            "completed" => Ok(SyncPhase::Completed),
            "failed" => Ok(SyncPhase::Failed),
            "cancelled" => Ok(SyncPhase::Cancelled),
            _ => Err(SyncError::InvalidPhase(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One sync run's lifecycle record.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub phase: SyncPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: SyncRunId::new(),
            phase: SyncPhase::Idle,
            started_at,
            finished_at: None,
            error_message: None,
        }
    }

    /// Move to a non-terminal phase or to `Completed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed from the current phase
    pub fn advance(&mut self, to: SyncPhase, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(to)?;
        self.phase = to;
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.advance(SyncPhase::Failed, now)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.advance(SyncPhase::Cancelled, now)
    }

    fn validate_transition(&self, to: SyncPhase) -> Result<()> {
        let valid = match (self.phase, to) {
            (from, _) if from.is_terminal() => false,

            (SyncPhase::Idle, SyncPhase::Comparing) => true,
            (SyncPhase::Comparing, SyncPhase::Planning) => true,
            (SyncPhase::Planning, SyncPhase::Applying) => true,
            (SyncPhase::Planning, SyncPhase::Completed) => true,
            (SyncPhase::Applying, SyncPhase::Completed) => true,

            (_, SyncPhase::Failed) | (_, SyncPhase::Cancelled) => true,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.phase.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

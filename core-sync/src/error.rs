use bridge_traits::{BridgeError, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid option {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Authentication failed while listing {account}: {message}")]
    Auth { account: String, message: String },

    #[error("Listing {account} failed: {source}")]
    Listing {
        account: String,
        #[source]
        source: BridgeError,
    },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid run ID: {0}")]
    InvalidRunId(String),

    #[error("Invalid sync phase: {0}")]
    InvalidPhase(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        SyncError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Classify a listing failure for `account`.
    pub(crate) fn from_listing(account: &str, error: BridgeError) -> Self {
        match error {
            BridgeError::Cancelled => SyncError::Cancelled,
            BridgeError::Auth(message) => SyncError::Auth {
                account: account.to_string(),
                message,
            },
            source => SyncError::Listing {
                account: account.to_string(),
                source,
            },
        }
    }

    /// Whether running the same sync again later could succeed without
    /// operator intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Listing { source, .. } => source.kind() != ErrorKind::Permanent,
            SyncError::Cancelled => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

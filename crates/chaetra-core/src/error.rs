//! Error types for chaetra operations.
//!
//! Every fallible operation returns [`ChaetraResult`]. Errors carry a stable
//! [`ErrorCode`] for programmatic handling and, where useful, a suggestion for
//! the caller.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for chaetra operations.
pub type ChaetraResult<T> = Result<T, ChaetraError>;

/// Main error type for all chaetra operations.
#[derive(Error, Debug)]
pub enum ChaetraError {
    /// Unknown knowledge item id or opinion topic.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        key: Option<String>,
    },

    /// Evidence rejected at the boundary (non-positive weight, missing source).
    #[error("Invalid evidence: {message}")]
    InvalidEvidence { message: String, code: ErrorCode },

    /// The per-item lock could not be acquired within the bounded wait.
    ///
    /// Signals contention, not corruption. The operation can be re-issued.
    #[error("Concurrent mutation timeout on item {item_id} after {waited:?}")]
    ConcurrentMutationTimeout {
        item_id: String,
        waited: Duration,
        code: ErrorCode,
    },

    /// A tier change the state machine does not allow.
    #[error("Invalid tier transition for item {item_id}: {from} -> {to}")]
    InvalidTransition {
        item_id: String,
        from: crate::types::Tier,
        to: crate::types::Tier,
    },

    /// Configuration error (thresholds out of range, non-positive TTL, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persistence operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Background job scheduler failed.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Knowledge (KNW_xxx)
    KnwItemNotFound,
    KnwOpinionNotFound,
    KnwTopicEmpty,
    KnwReplayMismatch,
    KnwItemRemoved,
    KnwInvalidTransition,

    // Evidence (EVD_xxx)
    EvdNonPositiveWeight,
    EvdMissingSource,

    // Concurrency (CON_xxx)
    ConMutationTimeout,

    // Configuration (CFG_xxx)
    CfgInvalid,

    // Database (DB_xxx)
    DbOperationFailed,

    // Scheduler (SCH_xxx)
    SchFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::KnwItemNotFound => "KNW_001",
            ErrorCode::KnwOpinionNotFound => "KNW_002",
            ErrorCode::KnwTopicEmpty => "KNW_003",
            ErrorCode::KnwReplayMismatch => "KNW_004",
            ErrorCode::KnwItemRemoved => "KNW_005",
            ErrorCode::KnwInvalidTransition => "KNW_006",
            ErrorCode::EvdNonPositiveWeight => "EVD_001",
            ErrorCode::EvdMissingSource => "EVD_002",
            ErrorCode::ConMutationTimeout => "CON_001",
            ErrorCode::CfgInvalid => "CFG_001",
            ErrorCode::DbOperationFailed => "DB_001",
            ErrorCode::SchFailed => "SCH_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl ChaetraError {
    /// Create a not found error for a knowledge item.
    pub fn not_found(item_id: impl Into<String>) -> Self {
        let id = item_id.into();
        Self::NotFound {
            message: format!("Knowledge item '{}' not found", id),
            code: ErrorCode::KnwItemNotFound,
            key: Some(id),
        }
    }

    /// Create a not found error for an opinion topic.
    pub fn opinion_not_found(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self::NotFound {
            message: format!("No opinion stored for topic '{}'", topic),
            code: ErrorCode::KnwOpinionNotFound,
            key: Some(topic),
        }
    }

    /// Create a not found error for a topic with no live knowledge.
    pub fn empty_topic(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self::NotFound {
            message: format!("No active knowledge for topic '{}'", topic),
            code: ErrorCode::KnwTopicEmpty,
            key: Some(topic),
        }
    }

    /// Create an error for a mutation aimed at a tombstoned item.
    pub fn removed(item_id: impl Into<String>) -> Self {
        let id = item_id.into();
        Self::NotFound {
            message: format!("Knowledge item '{}' has been removed", id),
            code: ErrorCode::KnwItemRemoved,
            key: Some(id),
        }
    }

    /// Create an error for an item whose ledger does not replay to its state.
    pub fn replay_mismatch(item_id: impl Into<String>) -> Self {
        Self::Internal(format!(
            "{}: stored confidence of item '{}' does not match its evidence ledger",
            ErrorCode::KnwReplayMismatch.as_str(),
            item_id.into()
        ))
    }

    /// Create an invalid evidence error.
    pub fn invalid_evidence(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::InvalidEvidence {
            message: message.into(),
            code,
        }
    }

    /// Create a mutation timeout error.
    pub fn mutation_timeout(item_id: impl Into<String>, waited: Duration) -> Self {
        Self::ConcurrentMutationTimeout {
            item_id: item_id.into(),
            waited,
            code: ErrorCode::ConMutationTimeout,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { code, .. } => *code,
            Self::InvalidEvidence { code, .. } => *code,
            Self::ConcurrentMutationTimeout { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::InvalidTransition { .. } => ErrorCode::KnwInvalidTransition,
            Self::Configuration(_) => ErrorCode::CfgInvalid,
            Self::Scheduler(_) => ErrorCode::SchFailed,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the caller may safely re-issue the operation.
    ///
    /// The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentMutationTimeout { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::NotFound { .. } => Some("Check the item id or topic and ensure it exists"),
            Self::InvalidEvidence { .. } => {
                Some("Evidence needs a non-empty source and a positive weight")
            }
            Self::ConcurrentMutationTimeout { .. } => {
                Some("The item is under contention; retry the operation")
            }
            Self::Configuration(_) => {
                Some("Thresholds must lie in [0, 1] and durations must be positive")
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ChaetraError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for ChaetraError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Self::Scheduler(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ChaetraError::not_found("item-1");
        assert_eq!(err.code(), ErrorCode::KnwItemNotFound);
        assert!(err.to_string().contains("item-1"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        let timeout = ChaetraError::mutation_timeout("item-1", Duration::from_millis(50));
        assert!(timeout.is_retryable());
        assert_eq!(timeout.code().as_str(), "CON_001");

        let invalid =
            ChaetraError::invalid_evidence(ErrorCode::EvdNonPositiveWeight, "weight was 0");
        assert!(!invalid.is_retryable());
        assert!(!ChaetraError::configuration("bad").is_retryable());
    }

    #[test]
    fn test_removed_is_not_found_variant() {
        let err = ChaetraError::removed("item-9");
        assert_eq!(err.code(), ErrorCode::KnwItemRemoved);
        assert!(matches!(err, ChaetraError::NotFound { .. }));
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::KnwItemNotFound.as_str(), "KNW_001");
        assert_eq!(ErrorCode::EvdMissingSource.as_str(), "EVD_002");
        assert_eq!(ChaetraError::configuration("x").code(), ErrorCode::CfgInvalid);
    }
}

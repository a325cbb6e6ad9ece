//! # Sync Error Types
//!
//! Error types for the sync engine and the offline-aware facade.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Availability   │  │    Remote       │  │     Local               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Offline        │  │  Network        │  │  Database               │ │
//! │  │  CacheMiss      │  │  Timeout        │  │  Serialization          │ │
//! │  │                 │  │  Server 5xx     │  │  Validation             │ │
//! │  │                 │  │  Rejected 4xx   │  │  ActionNotFound         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  RETRYABLE: the drain re-attempts on the next pass                     │
//! │  PERMANENT: kept in the queue, surfaced to the user, never re-sent     │
//! │             automatically                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering availability, remote, and local failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Availability Errors
    // =========================================================================
    /// The device is offline and the operation needs the network.
    #[error("Device is offline")]
    Offline,

    /// Offline and the requested data was never cached.
    #[error("Offline and no cached copy of {key}")]
    CacheMiss { key: String },

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The server rejected or failed the request.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Persistence failure (cache or queue).
    #[error("Database error: {0}")]
    Database(#[from] darzi_db::DbError),

    /// Domain-level failure (unknown tag, missing id).
    #[error(transparent)]
    Core(#[from] darzi_core::CoreError),

    /// Entity failed local validation before any write happened.
    #[error(transparent)]
    Validation(#[from] darzi_core::ValidationError),

    /// JSON (de)serialization failure.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No queued action with the given id.
    #[error("No pending action with id {0}")]
    ActionNotFound(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The engine is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if a later drain pass may succeed without user action.
    ///
    /// ## Retryable
    /// - Offline (connectivity will return)
    /// - Network failures, timeouts, server 5xx
    ///
    /// ## Permanent
    /// - Server rejections (validation, not found)
    /// - Local validation and serialization failures
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline => true,
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Database(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::Remote(RemoteError::Timeout).is_retryable());
        assert!(SyncError::Remote(RemoteError::Network("reset".into())).is_retryable());
        assert!(SyncError::Remote(RemoteError::Server {
            status: 503,
            message: "unavailable".into()
        })
        .is_retryable());

        assert!(!SyncError::Remote(RemoteError::Rejected {
            status: 422,
            message: "missing customerId".into()
        })
        .is_retryable());
        assert!(!SyncError::ActionNotFound("abc".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_cache_miss_display() {
        let err = SyncError::CacheMiss {
            key: "bill:list".into(),
        };
        assert!(err.to_string().contains("bill:list"));
    }
}

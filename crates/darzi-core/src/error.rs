//! # Error Types
//!
//! Domain-specific error types for darzi-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  darzi-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  darzi-db errors (separate crate)                                      │
//! │  └── DbError          - Persistence failures                           │
//! │                                                                         │
//! │  darzi-sync errors (separate crate)                                    │
//! │  └── SyncError        - Offline / retryable / permanent sync failures  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → UI                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (entity kind, id, field)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent business rule violations or malformed local input.
/// They fail synchronously at the facade; they are never queued.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record cannot be found in the local cache.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Entity kind tag did not match any known kind.
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// Action type tag did not match create/update/delete.
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// A mutation referenced an entity without an identifier.
    #[error("Missing identifier for {kind}")]
    MissingId { kind: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when user input doesn't meet the backend's required-field
/// rules. Used for early validation before a mutation is cached or queued.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid date string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Collection must contain at least one element.
    #[error("{field} must not be empty")]
    Empty { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

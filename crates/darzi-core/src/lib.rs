//! # darzi-core: Pure Domain Logic for Darzi
//!
//! This crate is the **heart** of Darzi, an offline-first billing app for
//! tailoring shops. It contains all domain logic as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Darzi Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Mobile UI (out of scope)                     │   │
//! │  │    Bill screens ──► Customer screens ──► Config screens        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               darzi-sync (Offline-Aware Facade)                 │   │
//! │  │    per-entity CRUD, optimistic writes, queue drains            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ darzi-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │    ids    │  │  action   │  │ validation│  │   │
//! │  │   │   Bill    │  │provisional│  │ Pending   │  │   rules   │  │   │
//! │  │   │ Customer  │  │ canonical │  │  Action   │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    darzi-db (Persistence Layer)                 │   │
//! │  │          SQLite cache entries + durable pending actions         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Bill, Customer, MeasurementConfig, etc.)
//! - [`action`] - Pending actions queued while offline
//! - [`ids`] - Provisional vs. canonical identifier rules
//! - [`error`] - Domain error types
//! - [`validation`] - Required-field and range validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Explicit Errors**: All errors are typed, never strings or panics
//! 4. **Offline-Safe Ids**: Entities created offline get a tagged provisional
//!    id that the sync engine later swaps for the server-assigned one
//!
//! ## Example Usage
//!
//! ```rust
//! use darzi_core::ids;
//! use darzi_core::types::EntityKind;
//!
//! // An entity created offline gets a provisional id...
//! let id = ids::provisional();
//! assert!(ids::is_provisional(&id));
//!
//! // ...which is keyed into the cache per entity kind.
//! let key = EntityKind::Bill.record_key(&id);
//! assert!(key.starts_with("bill:"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod error;
pub mod ids;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use darzi_core::Bill` instead of
// `use darzi_core::types::Bill`

pub use action::{ActionType, PendingAction};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default number of replay attempts before an action is surfaced as a
/// permanent failure.
///
/// ## Why 5?
/// Each drain pass retries a failed action once, and automatic drains back
/// off exponentially between passes. Five attempts spans several minutes of
/// flaky connectivity without hammering the server forever. Configurable via
/// `[sync] max_attempts` in darzi-sync.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

//! # darzi-db: Persistence Layer for Darzi
//!
//! This crate provides local persistence for the offline engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Darzi Data Flow                                 │
//! │                                                                         │
//! │  Facade / Sync Engine (darzi-sync)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     darzi-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (cache.rs,    │    │  (embedded)  │  │   │
//! │  │   │               │    │  queue.rs)    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ CacheStore    │    │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │ ActionQueue   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │          <app data dir>/darzi.db (survives restarts)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Cache store and action queue repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use darzi_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/darzi.db")).await?;
//!
//! db.cache().set("bill:list", &serde_json::json!([])).await?;
//! let pending = db.queue().size().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cache::{CacheEntry, CacheStore};
pub use repository::queue::ActionQueue;

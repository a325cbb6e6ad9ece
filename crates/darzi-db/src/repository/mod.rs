//! # Repository Implementations
//!
//! Repository pattern for persistence access.
//!
//! ## Why Repositories?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Repository Pattern                                 │
//! │                                                                         │
//! │  WITHOUT Repositories          WITH Repositories                       │
//! │  ────────────────────          ─────────────────                       │
//! │  SQL scattered everywhere      SQL in one place per concern            │
//! │  Hard to test                  Each repo testable in isolation         │
//! │  Engine knows table layout     Engine sees typed operations            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`cache`] - TTL-aware read-through cache entries
//! - [`queue`] - durable FIFO queue of pending actions

pub mod cache;
pub mod queue;

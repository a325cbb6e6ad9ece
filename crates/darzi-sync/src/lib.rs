//! # darzi-sync: Offline Sync Engine for Darzi
//!
//! Everything between the UI and the billing server: connectivity
//! tracking, the durable-queue drain, provisional-id reconciliation, and
//! the offline-aware facade.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       darzi-sync Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncService (Composition Root)                 │  │
//! │  │   Opens the store, builds the HTTP client, starts auto-sync      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                 │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │     Facade     │  │   SyncEngine   │  │  ConnectivityMonitor   │    │
//! │  │                │  │                │  │                        │    │
//! │  │ per-entity     │  │ FIFO drain,    │  │ online/offline state,  │    │
//! │  │ CRUD, cache-   │  │ id swap,       │  │ listeners, watch       │    │
//! │  │ first reads,   │  │ chain blocking │  │ channel for tasks      │    │
//! │  │ queue fallback │  │ auto-sync loop │  │                        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │          │                   │                                          │
//! │          ▼                   ▼                                          │
//! │  ┌──────────────────────────────────┐  ┌──────────────────────────┐    │
//! │  │   darzi-db (cache + queue)       │  │  RemoteApi (reqwest or   │    │
//! │  │                                  │  │  scripted test double)   │    │
//! │  └──────────────────────────────────┘  └──────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`service`] - Composition root and lifecycle
//! - [`facade`] - Per-entity offline-aware CRUD
//! - [`engine`] - Queue drain, id reconciliation, auto-sync loop
//! - [`connectivity`] - Online/offline state and listeners
//! - [`remote`] - The server seam (trait + reqwest implementation)
//! - [`events`] - Listener registry and subscriptions
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use darzi_sync::{SyncConfig, SyncService};
//!
//! let service = SyncService::init(SyncConfig::load_or_default(None)).await?;
//!
//! // Works identically online and offline:
//! let bill = service.facade().bills().create(bill).await?;
//!
//! // Platform reachability signals feed the monitor:
//! service.connectivity().set_online(false);
//!
//! // Status for the sync indicator:
//! let status = service.engine().refresh_status().await?;
//! println!("pending: {}", status.pending_actions);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod facade;
pub mod remote;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{CacheSettings, RemoteSettings, StorageSettings, SyncConfig, SyncSettings};
pub use connectivity::{ConnectivityChange, ConnectivityMonitor, ConnectivityProbe, ProbeHandle};
pub use engine::{AutoSyncHandle, DrainReport, SyncEngine, SyncFailure, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use events::{ListenerRegistry, Subscription};
pub use facade::{EntityHandle, Facade, Fetched, RefreshEvent};
pub use remote::{HttpRemoteApi, RemoteApi, RemoteError, RemoteResult};
pub use service::SyncService;

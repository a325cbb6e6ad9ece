//! # Sync Service
//!
//! Composition root wiring the store, remote client, connectivity monitor,
//! engine, and facade together for the embedding application.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Service Lifecycle                            │
//! │                                                                         │
//! │  SyncService::init(config)                                             │
//! │       │  open SQLite (migrations run), build HTTP client,              │
//! │       │  start the auto-sync loop if enabled                           │
//! │       ▼                                                                 │
//! │  running ── facade() for CRUD, engine() for status/drains,             │
//! │             connectivity() for platform reachability signals           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  shutdown() ── stop the loop, close the pool. Queued actions stay      │
//! │                on disk and replay on the next start.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use darzi_db::{Database, DbConfig};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, ProbeHandle};
use crate::engine::{AutoSyncHandle, SyncEngine};
use crate::error::SyncResult;
use crate::facade::Facade;
use crate::remote::{HttpRemoteApi, RemoteApi};

/// The assembled offline engine.
pub struct SyncService {
    db: Database,
    connectivity: ConnectivityMonitor,
    engine: SyncEngine,
    facade: Facade,
    auto_sync: Option<AutoSyncHandle>,
    probe: Option<ProbeHandle>,
}

impl SyncService {
    /// Opens the local store and wires up the engine against the real
    /// billing API.
    pub async fn init(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;

        let db_path = config.database_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(
            db = %db_path.display(),
            remote = %config.remote.base_url,
            "Initializing sync service"
        );

        let db = Database::new(DbConfig::new(db_path)).await?;
        let http = Arc::new(HttpRemoteApi::new(
            config.remote.base_url.clone(),
            config.remote_timeout(),
        )?);
        let remote: Arc<dyn RemoteApi> = Arc::clone(&http) as Arc<dyn RemoteApi>;

        let probe_secs = config.sync.connectivity_probe_secs;
        let mut service = Self::assemble(db, remote, config);
        if let Some(secs) = probe_secs {
            service.probe = Some(
                service
                    .connectivity
                    .start_probe(http, Duration::from_secs(secs)),
            );
        }
        Ok(service)
    }

    /// Wires the service over an already-open store and remote.
    ///
    /// The seam the tests and any non-HTTP embedding use.
    pub fn with_parts(db: Database, remote: Arc<dyn RemoteApi>, config: SyncConfig) -> Self {
        Self::assemble(db, remote, config)
    }

    fn assemble(db: Database, remote: Arc<dyn RemoteApi>, config: SyncConfig) -> Self {
        let connectivity = ConnectivityMonitor::new();
        let engine = SyncEngine::new(
            db.clone(),
            Arc::clone(&remote),
            connectivity.clone(),
            config.sync.clone(),
        );
        let facade = Facade::new(
            db.clone(),
            remote,
            connectivity.clone(),
            config.clone(),
        );

        let auto_sync = if config.sync.auto_sync_enabled {
            Some(engine.start_auto_sync())
        } else {
            None
        };

        SyncService {
            db,
            connectivity,
            engine,
            facade,
            auto_sync,
            probe: None,
        }
    }

    /// The per-entity CRUD facade.
    pub fn facade(&self) -> &Facade {
        &self.facade
    }

    /// The sync engine, for status queries and manual drains.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// The connectivity monitor; feed platform reachability signals here.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Stops the background loop and closes the store.
    ///
    /// Queued actions are durable; anything not yet drained replays after
    /// the next [`SyncService::init`].
    pub async fn shutdown(mut self) {
        info!("Shutting down sync service");
        if let Some(handle) = self.probe.take() {
            handle.shutdown().await;
        }
        if let Some(handle) = self.auto_sync.take() {
            handle.shutdown().await;
        }
        self.db.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Connectivity Monitor
//!
//! Single source of truth for whether the device is online.
//!
//! ## State Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Monitor                                │
//! │                                                                         │
//! │  Platform signal / probe / failed request                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  set_online(bool) ── deduplicated: same value twice emits once         │
//! │       │                                                                 │
//! │       ├──► listeners (facade decides local vs remote path)             │
//! │       └──► watch channel (auto-sync wakes on offline → online)         │
//! │                                                                         │
//! │  Starts ONLINE. A wrong optimistic start self-corrects: the first      │
//! │  failed remote call reports offline and the write falls back to the    │
//! │  queue.                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::events::{ListenerRegistry, Subscription};

/// Platform seam answering "can the backend be reached right now".
///
/// Embeddings with a pushed reachability signal skip this and call
/// [`ConnectivityMonitor::set_online`] directly.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// A connectivity transition delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    /// The new state.
    pub is_online: bool,
}

/// Tracks online/offline state and notifies interested components.
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<AtomicBool>,
    listeners: ListenerRegistry<ConnectivityChange>,
    watch_tx: Arc<watch::Sender<bool>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// Creates a monitor that starts online.
    pub fn new() -> Self {
        Self::with_initial(true)
    }

    /// Creates a monitor with an explicit initial state.
    pub fn with_initial(online: bool) -> Self {
        let (watch_tx, _) = watch::channel(online);
        ConnectivityMonitor {
            online: Arc::new(AtomicBool::new(online)),
            listeners: ListenerRegistry::new(),
            watch_tx: Arc::new(watch_tx),
        }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Reports a state observation.
    ///
    /// Deduplicated: reporting the current state again emits nothing, so
    /// callers can feed every platform signal through without flooding
    /// listeners.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        info!(online = online, "Connectivity changed");
        self.listeners.emit(&ConnectivityChange { is_online: online });
        let _ = self.watch_tx.send(online);
    }

    /// Registers a listener for state transitions.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ConnectivityChange) + Send + Sync + 'static,
    ) -> Subscription<ConnectivityChange> {
        self.listeners.subscribe(callback)
    }

    /// Returns a watch receiver mirroring the state, for async tasks that
    /// want to `await` transitions instead of registering callbacks.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.watch_tx.subscribe()
    }

    /// Spawns a loop polling the probe at the given interval and feeding
    /// each observation through [`set_online`](Self::set_online).
    pub fn start_probe(
        &self,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
    ) -> ProbeHandle {
        let monitor = self.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            debug!(interval_secs = interval.as_secs(), "Connectivity probe started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Connectivity probe shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        monitor.set_online(probe.check().await);
                    }
                }
            }
        });

        ProbeHandle { shutdown_tx, task }
    }
}

// =============================================================================
// Probe Handle
// =============================================================================

/// Handle to a running probe loop.
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ProbeHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_starts_online() {
        let monitor = ConnectivityMonitor::new();
        assert!(monitor.is_online());
    }

    #[test]
    fn test_transitions_are_deduplicated() {
        let monitor = ConnectivityMonitor::new();
        let transitions = Arc::new(AtomicUsize::new(0));

        let transitions2 = Arc::clone(&transitions);
        let _sub = monitor.subscribe(move |_| {
            transitions2.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_online(true); // already online, no emit
        monitor.set_online(false);
        monitor.set_online(false); // duplicate, no emit
        monitor.set_online(true);

        assert_eq!(transitions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_watch_mirrors_state() {
        let monitor = ConnectivityMonitor::new();
        let mut rx = monitor.watch();
        assert!(*rx.borrow());

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_loop_feeds_observations() {
        struct FlagProbe(AtomicBool);

        #[async_trait]
        impl ConnectivityProbe for FlagProbe {
            async fn check(&self) -> bool {
                self.0.load(Ordering::SeqCst)
            }
        }

        let monitor = ConnectivityMonitor::new();
        let probe = Arc::new(FlagProbe(AtomicBool::new(false)));
        let handle = monitor.start_probe(probe.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!monitor.is_online());

        probe.0.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(monitor.is_online());

        handle.shutdown().await;
    }

    #[test]
    fn test_dropped_listener_stops_receiving() {
        let monitor = ConnectivityMonitor::new();
        let transitions = Arc::new(AtomicUsize::new(0));

        let transitions2 = Arc::clone(&transitions);
        let sub = monitor.subscribe(move |_| {
            transitions2.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_online(false);
        drop(sub);
        monitor.set_online(true);

        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }
}

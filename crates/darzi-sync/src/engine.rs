//! # Sync Engine
//!
//! Drains the pending-action queue against the remote API and reconciles
//! provisional ids with server-assigned ones.
//!
//! ## Drain Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Queue Drain Pass                                │
//! │                                                                         │
//! │  snapshot queue (FIFO by seq)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each action, in order:                                            │
//! │       │                                                                 │
//! │       ├── chain already blocked this pass?  ──► skip                   │
//! │       ├── retry budget exhausted?           ──► surface, block chain   │
//! │       ├── references unconfirmed entity?    ──► skip, block chain      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  replay against remote                                                 │
//! │       │                                                                 │
//! │       ├── CREATE ok ──► swap provisional id everywhere:                │
//! │       │                 cache keys+values, queued rows, and the        │
//! │       │                 not-yet-replayed actions of this pass          │
//! │       ├── ok        ──► refresh cache, remove from queue               │
//! │       └── failed    ──► attempts += 1, block chain, keep action        │
//! │                                                                         │
//! │  ONE DRAIN AT A TIME: a second sync_now() while a pass is running      │
//! │  does not start another pass, it waits for and returns the running     │
//! │  pass's report.                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures block only their own chain. Independent entities keep syncing
//! even when one mutation is stuck. An action whose referenced CREATE is
//! gone from the queue can never resolve; it is surfaced as a permanent
//! failure instead of being skipped silently forever.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use darzi_core::{ActionType, EntityKind, PendingAction};
use darzi_db::Database;

use crate::config::SyncSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::events::{ListenerRegistry, Subscription};
use crate::remote::{response_id, RemoteApi, RemoteError};

// =============================================================================
// Drain Report
// =============================================================================

/// Outcome of one drain pass.
#[derive(Debug, Clone)]
pub struct DrainReport {
    /// Monotonic pass number (1-based, process-local).
    pub seq: u64,

    /// When the pass started.
    pub started_at: DateTime<Utc>,

    /// When the pass finished.
    pub finished_at: DateTime<Utc>,

    /// Actions replayed against the remote.
    pub attempted: usize,

    /// Actions confirmed and removed from the queue.
    pub succeeded: usize,

    /// Actions not attempted (blocked chain or unresolved dependency).
    pub skipped: usize,

    /// Failures recorded this pass. Empty means a clean pass.
    pub failures: Vec<SyncFailure>,

    /// True when the pass stopped early because connectivity dropped.
    pub aborted: bool,
}

impl DrainReport {
    /// True when the pass fully drained the queue: no failures, no skipped
    /// actions, and the pass was not cut short by going offline.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0 && !self.aborted
    }
}

/// One failed replay, surfaced to the sync-errors screen.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    /// Queue entry id (for discard / retry).
    pub action_id: String,

    /// What the action was doing.
    pub action: ActionType,
    pub kind: EntityKind,
    pub entity_id: String,

    /// Human-readable failure message.
    pub message: String,

    /// Whether a later pass retries this automatically.
    pub retryable: bool,

    /// Whether the retry budget is used up.
    pub exhausted: bool,
}

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot of the engine for external queries.
///
/// Queue-derived counters come from the last drain pass or
/// [`SyncEngine::refresh_status`]; enqueues between those points are not
/// reflected until the next refresh.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Current connectivity state.
    pub is_online: bool,

    /// True while a drain pass is running.
    pub is_syncing: bool,

    /// Actions still waiting in the queue.
    pub pending_actions: i64,

    /// Actions that have used up their retry budget.
    pub exhausted_actions: usize,

    /// When a drain pass last finished, clean or not.
    pub last_sync_attempt: Option<DateTime<Utc>>,

    /// When a drain pass last fully drained the queue.
    pub last_successful_sync: Option<DateTime<Utc>>,

    /// Failures from the most recent pass, until cleared.
    pub sync_errors: Vec<SyncFailure>,

    /// The most recent drain pass, if any ran.
    pub last_drain: Option<DrainReport>,
}

/// What a finished pass publishes to callers that joined it mid-flight.
///
/// A pass that died (store error, not replay failures) publishes the error
/// text so joiners return instead of waiting forever.
struct PassOutcome {
    seq: u64,
    result: Result<Arc<DrainReport>, String>,
}

/// Counters behind the status snapshot, updated by drains and refreshes.
#[derive(Debug, Default)]
struct StatusState {
    pending_actions: i64,
    exhausted_actions: usize,
    last_sync_attempt: Option<DateTime<Utc>>,
    last_successful_sync: Option<DateTime<Utc>>,
    errors: Vec<SyncFailure>,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Replays queued mutations and reconciles provisional ids.
///
/// Cloning shares all state; the facade, the auto-sync task, and the UI
/// each hold a clone.
#[derive(Clone)]
pub struct SyncEngine {
    db: Database,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    settings: SyncSettings,

    /// Held for the duration of a pass. try_lock failure means a pass is
    /// already running.
    drain_gate: Arc<Mutex<()>>,

    /// Publishes each finished pass; waiters in `sync_now` read it.
    report_tx: Arc<watch::Sender<Option<Arc<PassOutcome>>>>,

    /// Drain-completion listeners.
    listeners: ListenerRegistry<DrainReport>,

    /// Pass counter.
    pass_seq: Arc<AtomicU64>,

    /// Status counters, updated after each pass or on refresh.
    status_state: Arc<StdMutex<StatusState>>,
}

impl SyncEngine {
    /// Creates an engine over the given store, remote, and connectivity.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        settings: SyncSettings,
    ) -> Self {
        let (report_tx, _) = watch::channel(None);
        SyncEngine {
            db,
            remote,
            connectivity,
            settings,
            drain_gate: Arc::new(Mutex::new(())),
            report_tx: Arc::new(report_tx),
            listeners: ListenerRegistry::new(),
            pass_seq: Arc::new(AtomicU64::new(0)),
            status_state: Arc::new(StdMutex::new(StatusState::default())),
        }
    }

    /// Current connectivity, as the engine sees it.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Registers a listener invoked after every drain pass.
    pub fn subscribe_drains(
        &self,
        callback: impl Fn(&DrainReport) + Send + Sync + 'static,
    ) -> Subscription<DrainReport> {
        self.listeners.subscribe(callback)
    }

    // =========================================================================
    // Drain Entry Point
    // =========================================================================

    /// Drains the queue now, or joins the pass already in flight.
    ///
    /// At most one pass runs at a time. A caller that arrives while a pass
    /// is running does not start a second one; it waits for the running
    /// pass and returns that pass's report.
    pub async fn sync_now(&self) -> SyncResult<DrainReport> {
        if !self.connectivity.is_online() {
            debug!("sync_now while offline, nothing to do");
            return Err(SyncError::Offline);
        }

        let mut report_rx = self.report_tx.subscribe();
        let observed_seq = report_rx.borrow().as_ref().map(|o| o.seq).unwrap_or(0);

        match self.drain_gate.try_lock() {
            Ok(_guard) => match self.run_pass().await {
                Ok(report) => {
                    let report = Arc::new(report);
                    let _ = self.report_tx.send(Some(Arc::new(PassOutcome {
                        seq: report.seq,
                        result: Ok(Arc::clone(&report)),
                    })));
                    self.listeners.emit(&report);
                    Ok((*report).clone())
                }
                Err(err) => {
                    // A joined caller is waiting on this pass; tell it the
                    // pass died instead of leaving it blocked.
                    let _ = self.report_tx.send(Some(Arc::new(PassOutcome {
                        seq: self.pass_seq.load(Ordering::SeqCst),
                        result: Err(err.to_string()),
                    })));
                    Err(err)
                }
            },
            Err(_) => {
                debug!("Drain already in flight, waiting for its report");
                loop {
                    report_rx
                        .changed()
                        .await
                        .map_err(|_| SyncError::ChannelError("drain reporter closed".into()))?;
                    let latest = report_rx.borrow().clone();
                    if let Some(outcome) = latest {
                        if outcome.seq > observed_seq {
                            return match &outcome.result {
                                Ok(report) => Ok((**report).clone()),
                                Err(message) => Err(SyncError::Internal(format!(
                                    "joined drain pass failed: {message}"
                                ))),
                            };
                        }
                    }
                }
            }
        }
    }

    /// Drains and folds the result into the status counters. Caller holds
    /// the drain gate.
    async fn run_pass(&self) -> SyncResult<DrainReport> {
        let report = self.drain().await?;
        self.record_pass(&report).await?;
        Ok(report)
    }

    /// One pass over the queue. Caller holds the drain gate.
    async fn drain(&self) -> SyncResult<DrainReport> {
        let seq = self.pass_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();

        let queue = self.db.queue();
        let mut actions = queue.peek_ordered(None).await?;

        info!(pass = seq, queued = actions.len(), "Starting drain pass");

        let mut blocked: HashSet<String> = HashSet::new();
        let mut attempted = 0;
        let mut succeeded = 0;
        let mut skipped = 0;
        let mut failures = Vec::new();
        let mut aborted = false;

        let mut index = 0;
        while index < actions.len() {
            let action = actions[index].clone();
            index += 1;

            // Connectivity dropped mid-pass: stop, leave the rest queued.
            if !self.connectivity.is_online() {
                warn!(pass = seq, "Went offline mid-drain, stopping pass");
                aborted = true;
                break;
            }

            if blocked.contains(&action.chain_id) {
                skipped += 1;
                continue;
            }

            if action.is_exhausted() {
                debug!(action_id = %action.id, "Skipping exhausted action");
                blocked.insert(action.chain_id.clone());
                failures.push(SyncFailure {
                    action_id: action.id.clone(),
                    action: action.action,
                    kind: action.kind,
                    entity_id: action.entity_id.clone(),
                    message: format!(
                        "gave up after {} attempts; retry or discard manually",
                        action.attempts
                    ),
                    retryable: false,
                    exhausted: true,
                });
                continue;
            }

            // The payload references another entity the server has not
            // confirmed yet (its CREATE failed or is still queued behind).
            // A confirmed dependency would have been rewritten away; one
            // with no CREATE left in the queue can never resolve.
            if let Some(ref dep) = action.related_provisional_id {
                blocked.insert(action.chain_id.clone());
                let resolvable = actions
                    .iter()
                    .any(|a| a.action == ActionType::Create && a.entity_id == *dep);
                if resolvable {
                    debug!(
                        action_id = %action.id,
                        dependency = %dep,
                        "Skipping action with unconfirmed dependency"
                    );
                    skipped += 1;
                } else {
                    warn!(
                        action_id = %action.id,
                        dependency = %dep,
                        "Dependency create is no longer queued, action cannot replay"
                    );
                    failures.push(SyncFailure {
                        action_id: action.id.clone(),
                        action: action.action,
                        kind: action.kind,
                        entity_id: action.entity_id.clone(),
                        message: format!(
                            "depends on {dep}, which is no longer queued for creation; \
                             discard this action or recreate the record it references"
                        ),
                        retryable: false,
                        exhausted: false,
                    });
                }
                continue;
            }

            attempted += 1;
            match self.replay(&action).await {
                Ok(Some((old_id, new_id))) => {
                    succeeded += 1;
                    // Keep this pass's snapshot consistent with the rows the
                    // queue rewrite just updated.
                    for pending in actions[index..].iter_mut() {
                        rewrite_action_in_place(pending, &old_id, &new_id);
                    }
                }
                Ok(None) => succeeded += 1,
                Err(err) => {
                    let attempts = queue.increment_attempts(&action.id).await?;
                    let retryable = err.is_retryable();
                    let exhausted = attempts >= action.max_attempts;
                    error!(
                        action_id = %action.id,
                        kind = %action.kind,
                        entity_id = %action.entity_id,
                        attempts,
                        retryable,
                        "Action replay failed: {err}"
                    );
                    blocked.insert(action.chain_id.clone());
                    failures.push(SyncFailure {
                        action_id: action.id.clone(),
                        action: action.action,
                        kind: action.kind,
                        entity_id: action.entity_id.clone(),
                        message: err.to_string(),
                        retryable,
                        exhausted,
                    });
                }
            }
        }

        let report = DrainReport {
            seq,
            started_at,
            finished_at: Utc::now(),
            attempted,
            succeeded,
            skipped,
            failures,
            aborted,
        };

        info!(
            pass = seq,
            attempted = report.attempted,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Drain pass finished"
        );

        Ok(report)
    }

    /// Replays one action against the remote.
    ///
    /// Returns `Some((provisional, canonical))` when a CREATE was confirmed
    /// under a new id, `None` otherwise.
    async fn replay(&self, action: &PendingAction) -> SyncResult<Option<(String, String)>> {
        let cache = self.db.cache();
        let queue = self.db.queue();

        match action.action {
            ActionType::Create => {
                let record = self.remote.create(action.kind, &action.payload).await?;
                let canonical = response_id(&record)?;

                let swapped = if action.targets_provisional() && canonical != action.entity_id {
                    info!(
                        kind = %action.kind,
                        provisional = %action.entity_id,
                        canonical = %canonical,
                        "Create confirmed, reconciling ids"
                    );
                    cache.rewrite_id(&action.entity_id, &canonical).await?;
                    queue
                        .rewrite_provisional_id(&action.entity_id, &canonical)
                        .await?;
                    Some((action.entity_id.clone(), canonical.clone()))
                } else {
                    None
                };

                cache
                    .set(&action.kind.record_key(&canonical), &record)
                    .await?;
                queue.remove(&action.id).await?;
                Ok(swapped)
            }

            ActionType::Update => {
                let record = self
                    .remote
                    .update(action.kind, &action.entity_id, &action.payload)
                    .await?;
                cache
                    .set(&action.kind.record_key(&action.entity_id), &record)
                    .await?;
                queue.remove(&action.id).await?;
                Ok(None)
            }

            ActionType::Delete => {
                match self.remote.delete(action.kind, &action.entity_id).await {
                    Ok(()) => {}
                    // Already gone server-side; the delete is done.
                    Err(RemoteError::NotFound { .. }) => {
                        debug!(
                            kind = %action.kind,
                            entity_id = %action.entity_id,
                            "Delete target already absent on server"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
                cache
                    .remove(&action.kind.record_key(&action.entity_id))
                    .await?;
                queue.remove(&action.id).await?;
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Queue Management
    // =========================================================================

    /// All queued actions in replay order.
    pub async fn pending_actions(&self) -> SyncResult<Vec<PendingAction>> {
        Ok(self.db.queue().peek_ordered(None).await?)
    }

    /// Number of queued actions.
    pub async fn queue_size(&self) -> SyncResult<i64> {
        Ok(self.db.queue().size().await?)
    }

    /// Drops a queued action without replaying it (user gave up on it).
    pub async fn discard(&self, action_id: &str) -> SyncResult<()> {
        info!(action_id = %action_id, "Discarding pending action");
        self.db.queue().remove(action_id).await?;
        Ok(())
    }

    /// Resets an action's retry budget so the next pass replays it again.
    pub async fn retry(&self, action_id: &str) -> SyncResult<()> {
        info!(action_id = %action_id, "Resetting pending action for retry");
        self.db
            .queue()
            .reset_attempts(action_id)
            .await
            .map_err(|e| match e {
                darzi_db::DbError::NotFound { .. } => {
                    SyncError::ActionNotFound(action_id.to_string())
                }
                other => other.into(),
            })
    }

    /// Snapshot of the engine for status screens. Cheap and synchronous;
    /// counters are as of the last drain or [`refresh_status`](Self::refresh_status).
    pub fn status(&self) -> SyncStatus {
        let state = self
            .status_state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let last_drain = self
            .report_tx
            .subscribe()
            .borrow()
            .as_ref()
            .and_then(|o| o.result.as_ref().ok())
            .map(|r| (**r).clone());

        SyncStatus {
            is_online: self.connectivity.is_online(),
            is_syncing: self.drain_gate.try_lock().is_err(),
            pending_actions: state.pending_actions,
            exhausted_actions: state.exhausted_actions,
            last_sync_attempt: state.last_sync_attempt,
            last_successful_sync: state.last_successful_sync,
            sync_errors: state.errors.clone(),
            last_drain,
        }
    }

    /// Recounts the queue-derived counters and returns the fresh snapshot.
    pub async fn refresh_status(&self) -> SyncResult<SyncStatus> {
        self.recount_queue().await?;
        Ok(self.status())
    }

    /// Drops recorded drain failures from the status snapshot.
    ///
    /// The failed actions themselves stay queued; resolve those with
    /// [`retry`](Self::retry) or [`discard`](Self::discard).
    pub fn clear_sync_errors(&self) {
        self.status_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .errors
            .clear();
    }

    async fn recount_queue(&self) -> SyncResult<()> {
        let pending = self.db.queue().peek_ordered(None).await?;
        let exhausted = pending.iter().filter(|a| a.is_exhausted()).count();
        let mut state = self
            .status_state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        state.pending_actions = pending.len() as i64;
        state.exhausted_actions = exhausted;
        Ok(())
    }

    /// Folds a finished pass into the status counters.
    async fn record_pass(&self, report: &DrainReport) -> SyncResult<()> {
        self.recount_queue().await?;
        let mut state = self
            .status_state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        state.last_sync_attempt = Some(report.finished_at);
        if report.is_clean() {
            state.last_successful_sync = Some(report.finished_at);
        }
        state.errors = report.failures.clone();
        Ok(())
    }

    // =========================================================================
    // Auto-Sync Scheduling
    // =========================================================================

    /// Spawns the background drain loop.
    ///
    /// The loop drains on a fixed interval, immediately on an
    /// offline → online transition, and backs off exponentially while
    /// passes keep reporting failures.
    pub fn start_auto_sync(&self) -> AutoSyncHandle {
        let engine = self.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let mut conn_rx = self.connectivity.watch();

        let base = Duration::from_secs(self.settings.auto_sync_interval_secs);
        let initial_backoff = Duration::from_secs(self.settings.initial_backoff_secs);
        let max_backoff = Duration::from_secs(self.settings.max_backoff_secs);

        let task = tokio::spawn(async move {
            info!(interval_secs = base.as_secs(), "Auto-sync loop started");
            let mut delay = base;
            let mut consecutive_failures: u32 = 0;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Auto-sync loop shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                    changed = conn_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*conn_rx.borrow() {
                            // Went offline: nothing to drain until it returns.
                            continue;
                        }
                        info!("Connectivity restored, draining immediately");
                        consecutive_failures = 0;
                        delay = base;
                    }
                }

                if !engine.is_online() {
                    delay = base;
                    continue;
                }

                match engine.sync_now().await {
                    Ok(report) if report.is_clean() => {
                        consecutive_failures = 0;
                        delay = base;
                    }
                    Ok(report) => {
                        consecutive_failures += 1;
                        delay = backoff_delay(
                            initial_backoff,
                            max_backoff,
                            consecutive_failures,
                        );
                        warn!(
                            failed = report.failures.len(),
                            next_pass_secs = delay.as_secs(),
                            "Drain pass had failures, backing off"
                        );
                    }
                    Err(SyncError::Offline) => {
                        delay = base;
                    }
                    Err(err) => {
                        consecutive_failures += 1;
                        delay = backoff_delay(
                            initial_backoff,
                            max_backoff,
                            consecutive_failures,
                        );
                        error!(next_pass_secs = delay.as_secs(), "Drain pass failed: {err}");
                    }
                }
            }
        });

        AutoSyncHandle { shutdown_tx, task }
    }
}

/// Exponential backoff: initial * 2^(n-1), capped.
fn backoff_delay(initial: Duration, max: Duration, consecutive_failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(consecutive_failures.saturating_sub(1));
    initial.saturating_mul(factor).min(max)
}

/// Rewrites a confirmed id inside an in-memory action snapshot, mirroring
/// what `ActionQueue::rewrite_provisional_id` did to the stored rows.
fn rewrite_action_in_place(action: &mut PendingAction, old_id: &str, new_id: &str) {
    if action.entity_id == old_id {
        action.entity_id = new_id.to_string();
    }
    if action.chain_id == old_id {
        action.chain_id = new_id.to_string();
    }
    if action.related_provisional_id.as_deref() == Some(old_id) {
        action.related_provisional_id = None;
    }
    rewrite_value(&mut action.payload, old_id, new_id);
}

fn rewrite_value(value: &mut Value, old_id: &str, new_id: &str) {
    match value {
        Value::String(s) => {
            if s.contains(old_id) {
                *s = s.replace(old_id, new_id);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_value(item, old_id, new_id);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rewrite_value(item, old_id, new_id);
            }
        }
        _ => {}
    }
}

// =============================================================================
// Auto-Sync Handle
// =============================================================================

/// Handle to the background drain loop.
pub struct AutoSyncHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl AutoSyncHandle {
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
    use crate::remote::mock::MockRemoteApi;
    use darzi_db::DbConfig;
    use serde_json::json;

    async fn test_engine(online: bool) -> (SyncEngine, Arc<MockRemoteApi>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(MockRemoteApi::new());
        let connectivity = ConnectivityMonitor::with_initial(online);
        let engine = SyncEngine::new(
            db,
            remote.clone(),
            connectivity,
            SyncSettings::default(),
        );
        (engine, remote)
    }

    fn create_action(kind: EntityKind, id: &str, payload: Value) -> PendingAction {
        PendingAction::new(ActionType::Create, kind, id, payload)
    }

    #[tokio::test]
    async fn test_sync_now_offline_is_an_error() {
        let (engine, _remote) = test_engine(false).await;
        assert!(matches!(engine.sync_now().await, Err(SyncError::Offline)));
    }

    #[tokio::test]
    async fn test_drain_confirms_create_and_rewrites_everywhere() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();
        let cache = engine.db.cache();

        // Offline session: create a customer, then a bill against it, then
        // adjust the bill. Three actions, two chains, one dependency.
        let customer = create_action(
            EntityKind::Customer,
            "local-cust",
            json!({"id": "local-cust", "personalDetails": {"name": "Ahmed", "phone": "0301"}}),
        );
        let bill = create_action(
            EntityKind::Bill,
            "local-bill",
            json!({"id": "local-bill", "customerId": "local-cust", "totalAmount": 900}),
        );
        let bill_update = PendingAction::new(
            ActionType::Update,
            EntityKind::Bill,
            "local-bill",
            json!({"id": "local-bill", "customerId": "local-cust", "totalAmount": 1100}),
        );
        queue.enqueue(&customer).await.unwrap();
        queue.enqueue(&bill).await.unwrap();
        queue.enqueue(&bill_update).await.unwrap();

        cache
            .set("bill:local-bill", &json!({"id": "local-bill"}))
            .await
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(engine.queue_size().await.unwrap(), 0);

        // The bill reached the server under the canonical customer id.
        let canonical_bill = remote.record(EntityKind::Bill, "bill-2").unwrap();
        assert_eq!(canonical_bill["customerId"], "customer-1");
        assert_eq!(canonical_bill["totalAmount"], 1100);

        // No cache key still mentions a provisional id.
        assert!(cache.get("bill:local-bill").await.unwrap().is_none());
        assert!(cache.get("bill:bill-2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_chain_blocks_only_its_chain() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        let stuck = create_action(
            EntityKind::Service,
            "local-s1",
            json!({"id": "local-s1", "name": "Hemming"}),
        );
        let stuck_followup = PendingAction::new(
            ActionType::Update,
            EntityKind::Service,
            "local-s1",
            json!({"id": "local-s1", "name": "Hemming", "defaultPrice": 200}),
        );
        let independent = create_action(
            EntityKind::Customer,
            "local-c1",
            json!({"id": "local-c1", "personalDetails": {"name": "Sara", "phone": "0333"}}),
        );
        queue.enqueue(&stuck).await.unwrap();
        queue.enqueue(&stuck_followup).await.unwrap();
        queue.enqueue(&independent).await.unwrap();

        remote.fail_next(1, RemoteError::Network("connection reset".into()));

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].retryable);
        assert_eq!(report.skipped, 1); // the follow-up in the stuck chain
        assert_eq!(report.succeeded, 1); // the independent customer

        // The stuck chain stays queued with a bumped attempt counter.
        let remaining = queue.peek_ordered(None).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].attempts, 1);
        assert_eq!(remaining[1].attempts, 0);
        assert!(remote.record(EntityKind::Customer, "customer-1").is_some());
    }

    #[tokio::test]
    async fn test_dependent_action_waits_for_failed_dependency() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        let customer = create_action(
            EntityKind::Customer,
            "local-cust",
            json!({"id": "local-cust", "personalDetails": {"name": "Ali", "phone": "0345"}}),
        );
        let bill = create_action(
            EntityKind::Bill,
            "local-bill",
            json!({"id": "local-bill", "customerId": "local-cust", "totalAmount": 500}),
        );
        queue.enqueue(&customer).await.unwrap();
        queue.enqueue(&bill).await.unwrap();

        remote.fail_next(1, RemoteError::Timeout);

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.skipped, 1);

        // The bill was never sent with its dangling provisional reference.
        let calls = remote.calls();
        assert_eq!(calls, vec!["create customer".to_string()]);

        // Next pass succeeds end to end.
        let report = engine.sync_now().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(engine.queue_size().await.unwrap(), 0);
        let bill = remote.record(EntityKind::Bill, "bill-2").unwrap();
        assert_eq!(bill["customerId"], "customer-1");
    }

    #[tokio::test]
    async fn test_permanent_failure_is_surfaced_not_dropped() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        let action = create_action(
            EntityKind::Payment,
            "local-p1",
            json!({"id": "local-p1", "billId": "bill-9", "amount": -1}),
        );
        queue.enqueue(&action).await.unwrap();

        remote.fail_next(1, RemoteError::Rejected {
            status: 422,
            message: "amount must be positive".into(),
        });

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(!report.failures[0].retryable);
        assert!(report.failures[0].message.contains("amount must be positive"));

        // Kept for the user to discard or fix; never silently dropped.
        assert_eq!(engine.queue_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_action_is_not_replayed() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        let action = create_action(
            EntityKind::Service,
            "local-s1",
            json!({"id": "local-s1", "name": "Buttons"}),
        )
        .with_max_attempts(1);
        queue.enqueue(&action).await.unwrap();
        queue.increment_attempts(&action.id).await.unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].exhausted);
        assert!(remote.calls().is_empty());

        // Manual retry resets the budget and the next pass replays it.
        engine.retry(&action.id).await.unwrap();
        let report = engine.sync_now().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(engine.queue_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_record_unknown_to_server_succeeds() {
        let (engine, _remote) = test_engine(true).await;
        let queue = engine.db.queue();

        let action = PendingAction::new(
            ActionType::Delete,
            EntityKind::Service,
            "service-9",
            json!({"id": "service-9"}),
        );
        queue.enqueue(&action).await.unwrap();

        let report = engine.sync_now().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(engine.queue_size().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sync_now_joins_running_pass() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        queue
            .enqueue(&create_action(
                EntityKind::Service,
                "local-s1",
                json!({"id": "local-s1", "name": "Lining"}),
            ))
            .await
            .unwrap();

        remote.set_delay(Duration::from_millis(100));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        // The latecomer joined the running pass instead of starting its own.
        assert_eq!(first.seq, second.seq);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_action_with_no_queued_dependency_create_is_surfaced() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        let customer = create_action(
            EntityKind::Customer,
            "local-cust",
            json!({"id": "local-cust", "personalDetails": {"name": "Ali", "phone": "0345"}}),
        );
        let bill = create_action(
            EntityKind::Bill,
            "local-bill",
            json!({"id": "local-bill", "customerId": "local-cust", "totalAmount": 500}),
        );
        queue.enqueue(&customer).await.unwrap();
        queue.enqueue(&bill).await.unwrap();

        // The user gives up on the customer; the bill now references an id
        // nothing will ever create.
        engine.discard(&customer.id).await.unwrap();

        let report = engine.sync_now().await.unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.failures.len(), 1);
        assert!(!report.failures[0].retryable);
        assert!(report.failures[0].message.contains("local-cust"));
        assert!(remote.calls().is_empty());

        // Kept queued and visible in the status errors until resolved.
        assert_eq!(engine.queue_size().await.unwrap(), 1);
        assert_eq!(engine.status().sync_errors.len(), 1);
        assert!(engine.status().last_successful_sync.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pass_cut_short_by_offline_is_not_successful() {
        let (engine, remote) = test_engine(true).await;
        let queue = engine.db.queue();

        queue
            .enqueue(&create_action(
                EntityKind::Service,
                "local-s1",
                json!({"id": "local-s1", "name": "Hemming"}),
            ))
            .await
            .unwrap();
        queue
            .enqueue(&create_action(
                EntityKind::Customer,
                "local-c1",
                json!({"id": "local-c1", "personalDetails": {"name": "Sara", "phone": "0333"}}),
            ))
            .await
            .unwrap();

        remote.set_delay(Duration::from_millis(100));
        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.connectivity.set_online(false);

        let report = running.await.unwrap().unwrap();
        assert!(report.aborted);
        assert!(report.failures.is_empty());
        assert!(!report.is_clean());
        assert_eq!(engine.queue_size().await.unwrap(), 1);
        assert!(engine.status().last_sync_attempt.is_some());
        assert!(engine.status().last_successful_sync.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_pass_does_not_strand_joined_callers() {
        let (engine, _remote) = test_engine(true).await;
        // A closed store makes the pass itself error out rather than
        // recording replay failures.
        engine.db.close().await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };

        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .unwrap();
        assert!(first.is_err());
        assert!(second.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_reports_pass_in_flight() {
        let (engine, remote) = test_engine(true).await;
        engine
            .db
            .queue()
            .enqueue(&create_action(
                EntityKind::Service,
                "local-s1",
                json!({"id": "local-s1", "name": "Lining"}),
            ))
            .await
            .unwrap();

        remote.set_delay(Duration::from_millis(100));
        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(engine.status().is_syncing);

        running.await.unwrap().unwrap();
        assert!(!engine.status().is_syncing);
    }

    #[tokio::test]
    async fn test_status_reflects_queue_and_last_drain() {
        let (engine, _remote) = test_engine(true).await;

        let status = engine.refresh_status().await.unwrap();
        assert!(status.is_online);
        assert_eq!(status.pending_actions, 0);
        assert!(status.last_drain.is_none());
        assert!(status.last_sync_attempt.is_none());

        engine
            .db
            .queue()
            .enqueue(&create_action(
                EntityKind::Service,
                "local-s1",
                json!({"id": "local-s1", "name": "Piping"}),
            ))
            .await
            .unwrap();

        let status = engine.refresh_status().await.unwrap();
        assert_eq!(status.pending_actions, 1);

        engine.sync_now().await.unwrap();
        let status = engine.status();
        assert_eq!(status.pending_actions, 0);
        assert!(status.last_sync_attempt.is_some());
        assert_eq!(status.last_successful_sync, status.last_sync_attempt);
        assert!(status.sync_errors.is_empty());
        assert_eq!(status.last_drain.unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_clear_sync_errors_keeps_the_actions_queued() {
        let (engine, remote) = test_engine(true).await;
        engine
            .db
            .queue()
            .enqueue(&create_action(
                EntityKind::Service,
                "local-s1",
                json!({"id": "local-s1", "name": "Piping"}),
            ))
            .await
            .unwrap();
        remote.fail_next(
            1,
            RemoteError::Rejected {
                status: 422,
                message: "duplicate name".into(),
            },
        );

        engine.sync_now().await.unwrap();
        let status = engine.status();
        assert_eq!(status.sync_errors.len(), 1);
        assert!(status.last_successful_sync.is_none());
        assert!(status.last_sync_attempt.is_some());

        engine.clear_sync_errors();
        assert!(engine.status().sync_errors.is_empty());
        assert_eq!(engine.queue_size().await.unwrap(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let initial = Duration::from_secs(30);
        let max = Duration::from_secs(600);
        assert_eq!(backoff_delay(initial, max, 1), Duration::from_secs(30));
        assert_eq!(backoff_delay(initial, max, 2), Duration::from_secs(60));
        assert_eq!(backoff_delay(initial, max, 3), Duration::from_secs(120));
        assert_eq!(backoff_delay(initial, max, 10), max);
    }
}

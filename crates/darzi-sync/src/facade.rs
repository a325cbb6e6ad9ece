//! # Offline-Aware Facade
//!
//! The per-entity API the UI talks to. Every operation works offline; the
//! caller never branches on connectivity itself.
//!
//! ## Read and Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Offline-Aware Facade                                │
//! │                                                                         │
//! │  READ (list / get)                                                     │
//! │  ─────────────────                                                     │
//! │  online + fresh cache  ──► serve cache                                 │
//! │  online + stale cache  ──► serve cache, refresh in the background      │
//! │                            and notify refresh subscribers              │
//! │  online + cache miss   ──► fetch, re-cache (keeping queued             │
//! │                            provisional records visible), serve         │
//! │  offline + any cache   ──► serve cache, stale or not                   │
//! │  offline + no cache    ──► CacheMiss                                   │
//! │                                                                         │
//! │  WRITE (create / update / delete)                                      │
//! │  ────────────────────────────────                                      │
//! │  1. validate locally                                                   │
//! │  2. write cache optimistically (record + list)                         │
//! │  3. online?  try the server:                                           │
//! │       confirmed   ──► re-cache the canonical record                    │
//! │       any failure ──► enqueue for the sync engine; the optimistic      │
//! │                       record stays and is returned unconfirmed         │
//! │     offline? ──► enqueue                                               │
//! │                                                                         │
//! │  Deleting a record the server never saw cancels its queued chain       │
//! │  instead of enqueueing a delete.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use darzi_core::validation::{
    validate_bill, validate_customer, validate_measurement_config, validate_payment,
    validate_service, ValidationResult,
};
use darzi_core::{
    ids, ActionType, Bill, Customer, MeasurementConfig, OfflineEntity, Payment, PendingAction,
    Service,
};
use darzi_db::{CacheEntry, Database};

use crate::config::{CacheSettings, SyncConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::events::{ListenerRegistry, Subscription};
use crate::remote::{response_id, RemoteApi, RemoteError};

// =============================================================================
// Fetched
// =============================================================================

/// A read result with its provenance.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,

    /// True when served from the local cache rather than the server.
    pub is_from_cache: bool,

    /// False when the record (or any record in a list) still carries a
    /// provisional id the server has not confirmed.
    pub is_confirmed: bool,

    /// When the data was last written from an authoritative source.
    pub fetched_at: DateTime<Utc>,
}

/// A fresher value delivered to refresh subscribers after a background or
/// forced refresh.
#[derive(Debug, Clone)]
pub enum RefreshEvent<T> {
    Record(Fetched<T>),
    List(Fetched<Vec<T>>),
}

// =============================================================================
// Entity Handle
// =============================================================================

/// Offline-aware CRUD for one entity type.
///
/// Obtained from [`Facade`]; all per-entity behaviour (endpoint, cache
/// keys, validation) is resolved here so callers stay generic-free.
pub struct EntityHandle<T: OfflineEntity> {
    db: Database,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    cache_settings: CacheSettings,
    max_attempts: i64,
    validate: fn(&T) -> ValidationResult<()>,
    refresh: ListenerRegistry<RefreshEvent<T>>,
}

impl<T: OfflineEntity> Clone for EntityHandle<T> {
    fn clone(&self) -> Self {
        EntityHandle {
            db: self.db.clone(),
            remote: Arc::clone(&self.remote),
            connectivity: self.connectivity.clone(),
            cache_settings: self.cache_settings.clone(),
            max_attempts: self.max_attempts,
            validate: self.validate,
            refresh: self.refresh.clone(),
        }
    }
}

impl<T: OfflineEntity> EntityHandle<T> {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists all records, cache-first.
    ///
    /// A cached list is always served immediately; when it has gone stale
    /// and the device is online, a background refresh re-fetches it and
    /// notifies refresh subscribers with the fresher value.
    pub async fn list(&self) -> SyncResult<Fetched<Vec<T>>> {
        let key = T::KIND.list_key();
        let cached = self.db.cache().get(&key).await?;
        let online = self.connectivity.is_online();
        let now = Utc::now();

        match cached {
            Some(entry) => {
                if online && entry.is_stale(now) {
                    self.spawn_refresh(None);
                }
                Self::list_from_entry(entry)
            }
            None if online => self.fetch_list().await,
            None => Err(SyncError::CacheMiss { key }),
        }
    }

    /// Fetches one record, cache-first, with the same background-refresh
    /// behaviour as [`list`](Self::list).
    ///
    /// Provisional records exist only locally and are never requested from
    /// the server.
    pub async fn get(&self, id: &str) -> SyncResult<Fetched<T>> {
        let key = T::KIND.record_key(id);
        let cached = self.db.cache().get(&key).await?;
        let online = self.connectivity.is_online() && !ids::is_provisional(id);
        let now = Utc::now();

        match cached {
            Some(entry) => {
                if online && entry.is_stale(now) {
                    self.spawn_refresh(Some(id.to_string()));
                }
                Self::record_from_entry(entry)
            }
            None if online => self.fetch_record(id).await,
            None => Err(SyncError::CacheMiss { key }),
        }
    }

    /// Fetches the list from the server, bypassing the cache, and notifies
    /// refresh subscribers.
    pub async fn refresh_list(&self) -> SyncResult<Fetched<Vec<T>>> {
        let fetched = self.fetch_list().await?;
        self.refresh.emit(&RefreshEvent::List(fetched.clone()));
        Ok(fetched)
    }

    /// Fetches one record from the server, bypassing the cache, and
    /// notifies refresh subscribers.
    pub async fn refresh_record(&self, id: &str) -> SyncResult<Fetched<T>> {
        let fetched = self.fetch_record(id).await?;
        self.refresh.emit(&RefreshEvent::Record(fetched.clone()));
        Ok(fetched)
    }

    /// Registers a callback for values delivered by background or forced
    /// refreshes.
    pub fn subscribe_refresh(
        &self,
        callback: impl Fn(&RefreshEvent<T>) + Send + Sync + 'static,
    ) -> Subscription<RefreshEvent<T>> {
        self.refresh.subscribe(callback)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Creates a record.
    ///
    /// Offline, or when the server fails the call for any reason, the
    /// record keeps its provisional id and a CREATE is queued; the
    /// returned entity is usable immediately.
    pub async fn create(&self, mut entity: T) -> SyncResult<T> {
        (self.validate)(&entity)?;

        if entity.id().is_empty() {
            entity.set_id(ids::provisional());
        }
        entity.touch(Utc::now());

        let payload = serde_json::to_value(&entity)?;
        let record_key = T::KIND.record_key(entity.id());
        let cache = self.db.cache();

        cache.set(&record_key, &payload).await?;
        self.upsert_list_entry(&payload).await?;

        if !self.connectivity.is_online() {
            info!(kind = %T::KIND, id = %entity.id(), "Offline create, queued");
            self.enqueue(ActionType::Create, entity.id(), payload)
                .await?;
            return Ok(entity);
        }

        match self.remote.create(T::KIND, &payload).await {
            Ok(record) => {
                let canonical = response_id(&record)?;
                if canonical != entity.id() {
                    cache.rewrite_id(entity.id(), &canonical).await?;
                }
                cache
                    .set(&T::KIND.record_key(&canonical), &record)
                    .await?;
                self.upsert_list_entry(&record).await?;
                Ok(serde_json::from_value(record)?)
            }
            Err(err) => {
                debug!(kind = %T::KIND, id = %entity.id(), "Create failed, queued: {err}");
                self.enqueue(ActionType::Create, entity.id(), payload)
                    .await?;
                Ok(entity)
            }
        }
    }

    /// Updates a record, optimistically locally and then on the server.
    pub async fn update(&self, mut entity: T) -> SyncResult<T> {
        (self.validate)(&entity)?;
        if entity.id().is_empty() {
            return Err(darzi_core::CoreError::MissingId {
                kind: T::KIND.to_string(),
            }
            .into());
        }
        entity.touch(Utc::now());

        let payload = serde_json::to_value(&entity)?;
        let record_key = T::KIND.record_key(entity.id());
        let cache = self.db.cache();

        cache.set(&record_key, &payload).await?;
        self.upsert_list_entry(&payload).await?;

        // The server has never seen a provisional record; the queued chain
        // replays create-then-update in order.
        if !self.connectivity.is_online() || ids::is_provisional(entity.id()) {
            self.enqueue(ActionType::Update, entity.id(), payload)
                .await?;
            return Ok(entity);
        }

        match self.remote.update(T::KIND, entity.id(), &payload).await {
            Ok(record) => {
                cache.set(&record_key, &record).await?;
                self.upsert_list_entry(&record).await?;
                Ok(serde_json::from_value(record)?)
            }
            Err(err) => {
                debug!(kind = %T::KIND, id = %entity.id(), "Update failed, queued: {err}");
                self.enqueue(ActionType::Update, entity.id(), payload)
                    .await?;
                Ok(entity)
            }
        }
    }

    /// Deletes a record.
    ///
    /// A record the server never saw (still provisional) is removed by
    /// cancelling its queued chain; no delete is sent.
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let cache = self.db.cache();
        let queue = self.db.queue();
        let record_key = T::KIND.record_key(id);

        if ids::is_provisional(id) {
            info!(kind = %T::KIND, id = %id, "Deleting unsynced record, cancelling its queue chain");
            let actions = queue.peek_ordered(Some(T::KIND)).await?;
            for action in actions.iter().filter(|a| a.chain_id == id) {
                queue.remove(&action.id).await?;
            }
            cache.remove(&record_key).await?;
            self.remove_list_entry(id).await?;
            return Ok(());
        }

        cache.remove(&record_key).await?;
        self.remove_list_entry(id).await?;

        if !self.connectivity.is_online() {
            self.enqueue(ActionType::Delete, id, json!({ "id": id }))
                .await?;
            return Ok(());
        }

        match self.remote.delete(T::KIND, id).await {
            Ok(()) => Ok(()),
            // Already gone server-side; nothing left to do.
            Err(RemoteError::NotFound { .. }) => Ok(()),
            Err(err) => {
                debug!(kind = %T::KIND, id = %id, "Delete failed, queued: {err}");
                self.enqueue(ActionType::Delete, id, json!({ "id": id }))
                    .await?;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn list_from_entry(entry: CacheEntry) -> SyncResult<Fetched<Vec<T>>> {
        let data: Vec<T> = entry.decode()?;
        let is_confirmed = data.iter().all(|e| !ids::is_provisional(e.id()));
        Ok(Fetched {
            data,
            is_from_cache: true,
            is_confirmed,
            fetched_at: entry.fetched_at,
        })
    }

    fn record_from_entry(entry: CacheEntry) -> SyncResult<Fetched<T>> {
        let data: T = entry.decode()?;
        let is_confirmed = !ids::is_provisional(data.id());
        Ok(Fetched {
            data,
            is_from_cache: true,
            is_confirmed,
            fetched_at: entry.fetched_at,
        })
    }

    /// Blocking server fetch of the list; re-caches the result.
    async fn fetch_list(&self) -> SyncResult<Fetched<Vec<T>>> {
        let key = T::KIND.list_key();
        let mut value = self.remote.list(T::KIND).await?;
        // Records created offline are not on the server yet; keep them
        // visible until their queued CREATE is confirmed.
        self.overlay_queued_creates(&mut value).await?;
        self.db
            .cache()
            .set_with_ttl(&key, &value, Some(self.cache_settings.list_ttl()))
            .await?;
        let data: Vec<T> = serde_json::from_value(value)?;
        let is_confirmed = data.iter().all(|e| !ids::is_provisional(e.id()));
        Ok(Fetched {
            data,
            is_from_cache: false,
            is_confirmed,
            fetched_at: Utc::now(),
        })
    }

    /// Blocking server fetch of one record; re-caches the result.
    async fn fetch_record(&self, id: &str) -> SyncResult<Fetched<T>> {
        let key = T::KIND.record_key(id);
        let value = self.remote.fetch(T::KIND, id).await?;
        self.db
            .cache()
            .set_with_ttl(&key, &value, Some(self.cache_settings.record_ttl()))
            .await?;
        let data: T = serde_json::from_value(value)?;
        Ok(Fetched {
            data,
            is_from_cache: false,
            is_confirmed: true,
            fetched_at: Utc::now(),
        })
    }

    /// Fires a refresh without blocking the read that triggered it.
    fn spawn_refresh(&self, id: Option<String>) {
        let handle = self.clone();
        tokio::spawn(async move {
            let outcome = match id {
                Some(id) => handle.refresh_record(&id).await.map(|_| ()),
                None => handle.refresh_list().await.map(|_| ()),
            };
            if let Err(err) = outcome {
                debug!(kind = %T::KIND, "Background refresh failed: {err}");
            }
        });
    }

    async fn enqueue(&self, action: ActionType, entity_id: &str, payload: Value) -> SyncResult<()> {
        let action = PendingAction::new(action, T::KIND, entity_id, payload)
            .with_max_attempts(self.max_attempts);
        self.db.queue().enqueue(&action).await?;
        Ok(())
    }

    /// Re-applies queued offline creates on top of a freshly fetched list.
    async fn overlay_queued_creates(&self, list: &mut Value) -> SyncResult<()> {
        let queued = self.db.queue().peek_ordered(Some(T::KIND)).await?;
        for action in queued {
            if action.action == ActionType::Create && action.targets_provisional() {
                upsert_list_item(list, &action.payload);
            }
        }
        Ok(())
    }

    /// Mirrors a record write into the cached list, if one is cached.
    async fn upsert_list_entry(&self, record: &Value) -> SyncResult<()> {
        let cache = self.db.cache();
        let key = T::KIND.list_key();
        if let Some(entry) = cache.get(&key).await? {
            let mut list = entry.value;
            upsert_list_item(&mut list, record);
            cache.set_with_ttl(&key, &list, entry.ttl).await?;
        }
        Ok(())
    }

    /// Mirrors a record removal into the cached list, if one is cached.
    async fn remove_list_entry(&self, id: &str) -> SyncResult<()> {
        let cache = self.db.cache();
        let key = T::KIND.list_key();
        if let Some(entry) = cache.get(&key).await? {
            let mut list = entry.value;
            if let Value::Array(items) = &mut list {
                items.retain(|item| item_id(item) != Some(id));
            }
            cache.set_with_ttl(&key, &list, entry.ttl).await?;
        }
        Ok(())
    }

}

/// The identifying field of a wire-format record.
fn item_id(value: &Value) -> Option<&str> {
    value
        .get("id")
        .or_else(|| value.get("garmentType"))
        .and_then(Value::as_str)
}

/// Inserts or replaces a record in a wire-format list, matched by id.
fn upsert_list_item(list: &mut Value, record: &Value) {
    let Some(record_id) = item_id(record) else {
        return;
    };
    if let Value::Array(items) = list {
        match items.iter_mut().find(|item| item_id(item) == Some(record_id)) {
            Some(existing) => *existing = record.clone(),
            None => items.push(record.clone()),
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

/// Entry point handing out per-entity offline-aware handles.
///
/// Handles are built once so refresh subscriptions registered through an
/// accessor outlive the call.
#[derive(Clone)]
pub struct Facade {
    bills: EntityHandle<Bill>,
    customers: EntityHandle<Customer>,
    measurement_configs: EntityHandle<MeasurementConfig>,
    services: EntityHandle<Service>,
    payments: EntityHandle<Payment>,
}

fn handle<T: OfflineEntity>(
    db: &Database,
    remote: &Arc<dyn RemoteApi>,
    connectivity: &ConnectivityMonitor,
    config: &SyncConfig,
    validate: fn(&T) -> ValidationResult<()>,
) -> EntityHandle<T> {
    EntityHandle {
        db: db.clone(),
        remote: Arc::clone(remote),
        connectivity: connectivity.clone(),
        cache_settings: config.cache.clone(),
        max_attempts: config.sync.max_attempts,
        validate,
        refresh: ListenerRegistry::new(),
    }
}

impl Facade {
    /// Creates a facade over the shared store, remote, and connectivity.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        config: SyncConfig,
    ) -> Self {
        Facade {
            bills: handle(&db, &remote, &connectivity, &config, validate_bill),
            customers: handle(&db, &remote, &connectivity, &config, validate_customer),
            measurement_configs: handle(
                &db,
                &remote,
                &connectivity,
                &config,
                validate_measurement_config,
            ),
            services: handle(&db, &remote, &connectivity, &config, validate_service),
            payments: handle(&db, &remote, &connectivity, &config, validate_payment),
        }
    }

    /// Bills.
    pub fn bills(&self) -> &EntityHandle<Bill> {
        &self.bills
    }

    /// Customers.
    pub fn customers(&self) -> &EntityHandle<Customer> {
        &self.customers
    }

    /// Per-garment measurement field configuration.
    pub fn measurement_configs(&self) -> &EntityHandle<MeasurementConfig> {
        &self.measurement_configs
    }

    /// Billable service templates.
    pub fn services(&self) -> &EntityHandle<Service> {
        &self.services
    }

    /// Payments against bills.
    pub fn payments(&self) -> &EntityHandle<Payment> {
        &self.payments
    }

    /// Case-insensitive customer search over name, phone, and address.
    ///
    /// Works offline against the cached customer list.
    pub async fn search_customers(&self, query: &str) -> SyncResult<Fetched<Vec<Customer>>> {
        let mut fetched = self.customers().list().await?;
        let query = query.trim();
        if !query.is_empty() {
            fetched.data.retain(|c| c.matches_search(query));
        }
        Ok(fetched)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyncEngine;
    use crate::remote::mock::MockRemoteApi;
    use darzi_core::{BillItem, BillStatus, EntityKind, PersonalDetails};
    use darzi_db::DbConfig;

    struct Harness {
        facade: Facade,
        engine: SyncEngine,
        remote: Arc<MockRemoteApi>,
        connectivity: ConnectivityMonitor,
    }

    async fn harness(online: bool) -> Harness {
        harness_with(online, SyncConfig::default()).await
    }

    async fn harness_with(online: bool, config: SyncConfig) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(MockRemoteApi::new());
        let connectivity = ConnectivityMonitor::with_initial(online);
        let facade = Facade::new(
            db.clone(),
            remote.clone(),
            connectivity.clone(),
            config.clone(),
        );
        let engine = SyncEngine::new(db, remote.clone(), connectivity.clone(), config.sync);
        Harness {
            facade,
            engine,
            remote,
            connectivity,
        }
    }

    fn new_bill(customer_id: &str) -> Bill {
        Bill {
            id: String::new(),
            customer_id: customer_id.to_string(),
            bill_date: "2025-03-01".to_string(),
            total_amount: 1500,
            status: BillStatus::Pending,
            items: vec![BillItem {
                service_id: None,
                garment_type: Some("shalwar-kameez".to_string()),
                description: "Two piece suit".to_string(),
                quantity: 1,
                unit_price: 1500,
            }],
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn new_customer(name: &str, phone: &str) -> Customer {
        Customer {
            id: String::new(),
            personal_details: PersonalDetails {
                name: name.to_string(),
                phone: phone.to_string(),
                email: None,
                address: Some("Anarkali Bazaar, Lahore".to_string()),
            },
            measurements: Default::default(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn new_service(name: &str, price: i64) -> Service {
        Service {
            id: String::new(),
            name: name.to_string(),
            description: None,
            default_price: price,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn test_online_create_is_confirmed_immediately() {
        let h = harness(true).await;

        let service = h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        assert!(!ids::is_provisional(&service.id));
        assert_eq!(h.engine.queue_size().await.unwrap(), 0);

        let fetched = h.facade.services().get(&service.id).await.unwrap();
        assert!(fetched.is_confirmed);
        assert_eq!(fetched.data.name, "Hemming");
    }

    #[tokio::test]
    async fn test_validation_failure_writes_nothing() {
        let h = harness(true).await;

        let result = h.facade.services().create(new_service("", 200)).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(h.engine.queue_size().await.unwrap(), 0);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_offline_create_bill_end_to_end() {
        let h = harness(false).await;

        // Offline: create a customer and a bill against it.
        let customer = h
            .facade
            .customers()
            .create(new_customer("Ahmed Khan", "0301-1234567"))
            .await
            .unwrap();
        assert!(ids::is_provisional(&customer.id));

        let bill = h.facade.bills().create(new_bill(&customer.id)).await.unwrap();
        assert!(ids::is_provisional(&bill.id));
        assert_eq!(h.engine.queue_size().await.unwrap(), 2);

        // Both are readable offline, flagged unconfirmed.
        let fetched = h.facade.bills().get(&bill.id).await.unwrap();
        assert!(fetched.is_from_cache);
        assert!(!fetched.is_confirmed);

        // Connectivity returns; the drain confirms both and swaps ids.
        h.connectivity.set_online(true);
        let report = h.engine.sync_now().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(h.engine.queue_size().await.unwrap(), 0);

        let canonical_bill = h.remote.record(EntityKind::Bill, "bill-2").unwrap();
        assert_eq!(canonical_bill["customerId"], "customer-1");

        // The provisional bill is gone from the cache; the canonical one
        // is readable and confirmed.
        assert!(h.facade.bills().get(&bill.id).await.is_err());
        let fetched = h.facade.bills().get("bill-2").await.unwrap();
        assert!(fetched.is_confirmed);
    }

    #[tokio::test]
    async fn test_online_create_falls_back_to_queue_on_network_failure() {
        let h = harness(true).await;
        h.remote
            .fail_next(1, RemoteError::Network("connection refused".into()));

        let service = h.facade.services().create(new_service("Lining", 300)).await.unwrap();
        assert!(ids::is_provisional(&service.id));
        assert_eq!(h.engine.queue_size().await.unwrap(), 1);

        // Still visible locally while queued.
        let fetched = h.facade.services().get(&service.id).await.unwrap();
        assert!(!fetched.is_confirmed);
    }

    #[tokio::test]
    async fn test_server_rejection_keeps_optimistic_record_and_queues() {
        let h = harness(true).await;
        h.remote.fail_next(
            1,
            RemoteError::Rejected {
                status: 422,
                message: "duplicate name".into(),
            },
        );

        // A rejected call behaves like being offline: the caller gets the
        // optimistic record back and the action waits in the queue.
        let service = h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        assert!(ids::is_provisional(&service.id));
        assert_eq!(h.engine.queue_size().await.unwrap(), 1);

        let fetched = h.facade.services().get(&service.id).await.unwrap();
        assert!(!fetched.is_confirmed);
        assert_eq!(fetched.data.name, "Hemming");

        // The drain surfaces the rejection as a permanent failure and
        // keeps the action for manual resolution.
        h.remote.fail_next(
            1,
            RemoteError::Rejected {
                status: 422,
                message: "duplicate name".into(),
            },
        );
        let report = h.engine.sync_now().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(!report.failures[0].retryable);

        let status = h.engine.refresh_status().await.unwrap();
        assert_eq!(status.pending_actions, 1);
        assert!(status.last_successful_sync.is_none());
    }

    #[tokio::test]
    async fn test_list_is_cache_first_within_ttl() {
        let h = harness(true).await;
        h.facade.services().create(new_service("Hemming", 200)).await.unwrap();

        let first = h.facade.services().list().await.unwrap();
        assert!(!first.is_from_cache);
        assert_eq!(first.data.len(), 1);

        let second = h.facade.services().list().await.unwrap();
        assert!(second.is_from_cache);

        let list_calls = h.remote.calls().iter().filter(|c| c.starts_with("list")).count();
        assert_eq!(list_calls, 1);
    }

    #[tokio::test]
    async fn test_offline_list_serves_cache_and_misses_error() {
        let h = harness(true).await;
        h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        h.facade.services().list().await.unwrap();

        h.connectivity.set_online(false);
        let cached = h.facade.services().list().await.unwrap();
        assert!(cached.is_from_cache);
        assert_eq!(cached.data.len(), 1);

        let miss = h.facade.bills().list().await;
        assert!(matches!(miss, Err(SyncError::CacheMiss { .. })));
    }

    #[tokio::test]
    async fn test_fresh_list_keeps_queued_offline_creates_visible() {
        let h = harness(true).await;
        h.facade.services().create(new_service("Hemming", 200)).await.unwrap();

        // One more created while offline, still queued.
        h.connectivity.set_online(false);
        let offline = h.facade.services().create(new_service("Piping", 150)).await.unwrap();

        h.connectivity.set_online(true);
        let list = h.facade.services().list().await.unwrap();
        assert_eq!(list.data.len(), 2);
        assert!(list.data.iter().any(|s| s.id == offline.id));
        assert!(!list.is_confirmed);
    }

    #[tokio::test]
    async fn test_stale_list_serves_cache_then_refreshes_in_background() {
        let mut config = SyncConfig::default();
        config.cache.list_ttl_secs = 0; // every cached list is immediately stale
        let h = harness_with(true, config).await;

        h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        let first = h.facade.services().list().await.unwrap();
        assert!(!first.is_from_cache);

        let (tx, rx) = std::sync::mpsc::channel();
        let _sub = h.facade.services().subscribe_refresh(move |event| {
            if let RefreshEvent::List(list) = event {
                let _ = tx.send(list.data.len());
            }
        });

        let second = h.facade.services().list().await.unwrap();
        assert!(second.is_from_cache);
        assert_eq!(second.data.len(), 1);

        let refreshed = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let Ok(n) = rx.try_recv() {
                    return n;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(refreshed, 1);
    }

    #[tokio::test]
    async fn test_refresh_list_bypasses_fresh_cache() {
        let h = harness(true).await;
        h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        h.facade.services().list().await.unwrap();

        let cached = h.facade.services().list().await.unwrap();
        assert!(cached.is_from_cache);

        let forced = h.facade.services().refresh_list().await.unwrap();
        assert!(!forced.is_from_cache);
        assert_eq!(forced.data.len(), 1);

        let list_calls = h.remote.calls().iter().filter(|c| c.starts_with("list")).count();
        assert_eq!(list_calls, 2);
    }

    #[tokio::test]
    async fn test_offline_update_queues_and_shows_new_value() {
        let h = harness(true).await;
        let mut service = h.facade.services().create(new_service("Hemming", 200)).await.unwrap();

        h.connectivity.set_online(false);
        service.default_price = 250;
        h.facade.services().update(service.clone()).await.unwrap();

        let fetched = h.facade.services().get(&service.id).await.unwrap();
        assert_eq!(fetched.data.default_price, 250);
        assert_eq!(h.engine.queue_size().await.unwrap(), 1);

        h.connectivity.set_online(true);
        let report = h.engine.sync_now().await.unwrap();
        assert!(report.is_clean());
        let record = h.remote.record(EntityKind::Service, &service.id).unwrap();
        assert_eq!(record["defaultPrice"], 250);
    }

    #[tokio::test]
    async fn test_deleting_unsynced_record_cancels_its_chain() {
        let h = harness(false).await;

        let service = h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        let mut updated = service.clone();
        updated.default_price = 300;
        h.facade.services().update(updated).await.unwrap();
        assert_eq!(h.engine.queue_size().await.unwrap(), 2);

        h.facade.services().delete(&service.id).await.unwrap();

        // The whole chain is gone; the server never hears about it.
        assert_eq!(h.engine.queue_size().await.unwrap(), 0);
        assert!(h.facade.services().get(&service.id).await.is_err());

        h.connectivity.set_online(true);
        h.engine.sync_now().await.unwrap();
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_offline_delete_of_synced_record_queues_delete() {
        let h = harness(true).await;
        let service = h.facade.services().create(new_service("Hemming", 200)).await.unwrap();
        h.facade.services().list().await.unwrap();

        h.connectivity.set_online(false);
        h.facade.services().delete(&service.id).await.unwrap();

        let list = h.facade.services().list().await.unwrap();
        assert!(list.data.is_empty());
        assert_eq!(h.engine.queue_size().await.unwrap(), 1);

        h.connectivity.set_online(true);
        h.engine.sync_now().await.unwrap();
        assert!(h.remote.record(EntityKind::Service, &service.id).is_none());
    }

    #[tokio::test]
    async fn test_search_customers_matches_name_phone_address() {
        let h = harness(true).await;
        h.facade
            .customers()
            .create(new_customer("Ahmed Khan", "0301-1234567"))
            .await
            .unwrap();
        h.facade
            .customers()
            .create(new_customer("Sara Malik", "0333-7654321"))
            .await
            .unwrap();

        let by_name = h.facade.search_customers("ahmed").await.unwrap();
        assert_eq!(by_name.data.len(), 1);

        let by_phone = h.facade.search_customers("0333").await.unwrap();
        assert_eq!(by_phone.data.len(), 1);
        assert_eq!(by_phone.data[0].personal_details.name, "Sara Malik");

        let by_address = h.facade.search_customers("anarkali").await.unwrap();
        assert_eq!(by_address.data.len(), 2);

        let empty_query = h.facade.search_customers("  ").await.unwrap();
        assert_eq!(empty_query.data.len(), 2);
    }
}

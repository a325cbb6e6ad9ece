//! # Cache Store Repository
//!
//! Generic, TTL-aware key→value store backing read-through caching of
//! domain reads (bills, customers, configuration lists).
//!
//! ## Caching Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cache Store Layout                                 │
//! │                                                                         │
//! │  cache_entries                                                          │
//! │  key                 | value                  | fetched_at | ttl_secs  │
//! │  ────────────────────┼────────────────────────┼────────────┼────────── │
//! │  bill:list           | [ {...}, {...} ]       | 12:00:00   | 300       │
//! │  bill:bill-8421      | { "id": "bill-8421" }  | 12:01:30   | 300       │
//! │  customer:local-5f3a | { "id": "local-5f3a" } | 12:02:00   | NULL      │
//! │                                                                         │
//! │  RULES                                                                  │
//! │  • one key per list or per detail record (narrow keying)               │
//! │  • set() fully overwrites, no partial merges                           │
//! │  • each operation is one SQL statement → atomic per key                │
//! │  • no eviction beyond explicit remove()/clear()                        │
//! │  • NO network access inside this component                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Staleness is the caller's signal, not a deletion trigger: a stale entry
//! is still returned (offline reads depend on it), flagged via
//! [`CacheEntry::is_stale`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

use crate::error::DbResult;

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached value with its freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key, e.g. `bill:list` or `customer:cust-17`.
    pub key: String,

    /// The cached JSON document.
    pub value: Value,

    /// When the value was last written from an authoritative source.
    pub fetched_at: DateTime<Utc>,

    /// Time-to-live; `None` means the entry never expires on its own.
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// True once the entry's TTL has elapsed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.signed_duration_since(self.fetched_at);
                age.num_seconds() >= ttl.as_secs() as i64
            }
            None => false,
        }
    }

    /// Deserializes the cached document into a domain type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

// =============================================================================
// Cache Store
// =============================================================================

/// Repository for cache entries.
#[derive(Debug, Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    key: String,
    value: String,
    fetched_at: DateTime<Utc>,
    ttl_secs: Option<i64>,
}

impl CacheRow {
    fn into_entry(self) -> DbResult<CacheEntry> {
        Ok(CacheEntry {
            key: self.key,
            value: serde_json::from_str(&self.value)?,
            fetched_at: self.fetched_at,
            ttl: self.ttl_secs.map(|s| Duration::from_secs(s.max(0) as u64)),
        })
    }
}

impl CacheStore {
    /// Creates a new CacheStore.
    pub fn new(pool: SqlitePool) -> Self {
        CacheStore { pool }
    }

    /// Reads a cache entry by key.
    ///
    /// Returns `None` on a miss. Never touches the network.
    pub async fn get(&self, key: &str) -> DbResult<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT key, value, fetched_at, ttl_secs FROM cache_entries WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CacheRow::into_entry).transpose()
    }

    /// Writes a value with no TTL (never stale on its own).
    pub async fn set(&self, key: &str, value: &Value) -> DbResult<()> {
        self.set_with_ttl(key, value, None).await
    }

    /// Writes a value, fully overwriting any prior entry for the key.
    ///
    /// `INSERT OR REPLACE` makes the overwrite a single atomic statement;
    /// concurrent writers to different keys never block each other.
    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> DbResult<()> {
        let now = Utc::now();
        let json = serde_json::to_string(value)?;
        let ttl_secs = ttl.map(|t| t.as_secs() as i64);

        debug!(key = %key, ttl_secs = ?ttl_secs, "Caching value");

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries (key, value, fetched_at, ttl_secs)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(now)
        .bind(ttl_secs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes one entry. Removing a missing key is a no-op.
    pub async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes every entry.
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of cached entries.
    pub async fn size(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Rewrites every occurrence of a provisional id across keys and
    /// cached documents.
    ///
    /// Used by the drain once a CREATE is confirmed: afterwards no cache
    /// key or cached value still references the provisional id. Safe on
    /// substrings because provisional ids are `local-<uuid>` and cannot
    /// collide with other text.
    ///
    /// ## Returns
    /// Number of entries touched.
    pub async fn rewrite_id(&self, old_id: &str, new_id: &str) -> DbResult<u64> {
        debug!(old = %old_id, new = %new_id, "Rewriting provisional id in cache");

        let result = sqlx::query(
            r#"
            UPDATE cache_entries
            SET key = REPLACE(key, ?1, ?2),
                value = REPLACE(value, ?1, ?2)
            WHERE key LIKE '%' || ?1 || '%'
               OR value LIKE '%' || ?1 || '%'
            "#,
        )
        .bind(old_id)
        .bind(new_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_set_get_overwrite() {
        let cache = test_db().await.cache();

        cache.set("bill:b-1", &json!({"id": "b-1", "totalAmount": 500}))
            .await
            .unwrap();

        let entry = cache.get("bill:b-1").await.unwrap().unwrap();
        assert_eq!(entry.value["totalAmount"], 500);
        assert!(!entry.is_stale(Utc::now()));

        // A second set fully overwrites (no merge)
        cache.set("bill:b-1", &json!({"id": "b-1"})).await.unwrap();
        let entry = cache.get("bill:b-1").await.unwrap().unwrap();
        assert!(entry.value.get("totalAmount").is_none());
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let cache = test_db().await.cache();
        assert!(cache.get("bill:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_staleness() {
        let cache = test_db().await.cache();
        cache
            .set_with_ttl("customer:list", &json!([]), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let entry = cache.get("customer:list").await.unwrap().unwrap();
        assert!(!entry.is_stale(Utc::now()));
        assert!(entry.is_stale(Utc::now() + chrono::Duration::seconds(61)));
    }

    #[tokio::test]
    async fn test_remove_and_clear_are_idempotent() {
        let cache = test_db().await.cache();
        cache.set("service:list", &json!([])).await.unwrap();

        cache.remove("service:list").await.unwrap();
        cache.remove("service:list").await.unwrap(); // no-op
        assert!(cache.get("service:list").await.unwrap().is_none());

        cache.clear().await.unwrap();
        cache.clear().await.unwrap(); // no-op
        assert_eq!(cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rewrite_id_touches_keys_and_values() {
        let cache = test_db().await.cache();

        cache
            .set("bill:local-abc", &json!({"id": "local-abc", "customerId": "c-1"}))
            .await
            .unwrap();
        cache
            .set("bill:list", &json!([{"id": "local-abc"}, {"id": "b-2"}]))
            .await
            .unwrap();

        let touched = cache.rewrite_id("local-abc", "bill-777").await.unwrap();
        assert_eq!(touched, 2);

        // Old key gone, new key holds the rewritten document
        assert!(cache.get("bill:local-abc").await.unwrap().is_none());
        let entry = cache.get("bill:bill-777").await.unwrap().unwrap();
        assert_eq!(entry.value["id"], "bill-777");

        let list = cache.get("bill:list").await.unwrap().unwrap();
        assert_eq!(list.value[0]["id"], "bill-777");
        assert_eq!(list.value[1]["id"], "b-2");
    }
}

//! # Action Queue Repository
//!
//! Durable FIFO queue of pending actions (the outbox of the sync engine).
//!
//! ## Queue Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pending Action Queue                               │
//! │                                                                         │
//! │  pending_actions (seq is AUTOINCREMENT → global FIFO order)            │
//! │                                                                         │
//! │  seq | action | kind     | entity_id   | chain_id    | attempts        │
//! │  ────┼────────┼──────────┼─────────────┼─────────────┼─────────        │
//! │   1  | create | customer | local-c1    | local-c1    | 0               │
//! │   2  | create | bill     | local-b1    | local-b1    | 0               │
//! │   3  | update | bill     | local-b1    | local-b1    | 2               │
//! │                                                                         │
//! │  GUARANTEES                                                             │
//! │  • enqueue() returns only after the row is committed                   │
//! │  • peek_ordered() never mutates; drain order == enqueue order          │
//! │  • remove() is idempotent (replay after crash is safe)                 │
//! │  • attempt counters survive restarts                                   │
//! │                                                                         │
//! │  NEVER drops rows on its own. Exhausted actions stay until the user    │
//! │  discards them or a retry succeeds.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use darzi_core::{ActionType, EntityKind, PendingAction};

use crate::error::{DbError, DbResult};

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    action: String,
    kind: String,
    entity_id: String,
    payload: String,
    chain_id: String,
    related_provisional_id: Option<String>,
    attempts: i64,
    max_attempts: i64,
    created_at: DateTime<Utc>,
}

impl ActionRow {
    fn into_action(self) -> DbResult<PendingAction> {
        let action: ActionType = self.action.parse()?;
        let kind: EntityKind = self.kind.parse()?;

        Ok(PendingAction {
            id: self.id,
            action,
            kind,
            entity_id: self.entity_id,
            payload: serde_json::from_str(&self.payload)?,
            chain_id: self.chain_id,
            related_provisional_id: self.related_provisional_id,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            created_at: self.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, action, kind, entity_id, payload, chain_id, \
     related_provisional_id, attempts, max_attempts, created_at";

// =============================================================================
// Action Queue
// =============================================================================

/// Repository for the durable pending-action queue.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    pool: SqlitePool,
}

impl ActionQueue {
    /// Creates a new ActionQueue.
    pub fn new(pool: SqlitePool) -> Self {
        ActionQueue { pool }
    }

    /// Appends an action to the queue.
    ///
    /// Returns only after the row is durably committed; a crash after
    /// enqueue never loses the mutation.
    pub async fn enqueue(&self, action: &PendingAction) -> DbResult<()> {
        debug!(
            action_id = %action.id,
            kind = %action.kind,
            action = %action.action,
            entity_id = %action.entity_id,
            "Enqueueing pending action"
        );

        let payload = serde_json::to_string(&action.payload)?;

        sqlx::query(
            r#"
            INSERT INTO pending_actions
                (id, action, kind, entity_id, payload, chain_id,
                 related_provisional_id, attempts, max_attempts, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&action.id)
        .bind(action.action.to_string())
        .bind(action.kind.as_str())
        .bind(&action.entity_id)
        .bind(payload)
        .bind(&action.chain_id)
        .bind(&action.related_provisional_id)
        .bind(action.attempts)
        .bind(action.max_attempts)
        .bind(action.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns queued actions in enqueue order, optionally filtered by kind.
    ///
    /// Read-only: the drain decides what to remove, the queue only reports.
    pub async fn peek_ordered(&self, kind: Option<EntityKind>) -> DbResult<Vec<PendingAction>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query_as::<_, ActionRow>(&format!(
                    "SELECT {SELECT_COLUMNS} FROM pending_actions WHERE kind = ?1 ORDER BY seq ASC"
                ))
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ActionRow>(&format!(
                    "SELECT {SELECT_COLUMNS} FROM pending_actions ORDER BY seq ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(ActionRow::into_action).collect()
    }

    /// Fetches a single action by its queue entry id.
    pub async fn get(&self, action_id: &str) -> DbResult<Option<PendingAction>> {
        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM pending_actions WHERE id = ?1"
        ))
        .bind(action_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ActionRow::into_action).transpose()
    }

    /// Removes a completed (or discarded) action. Idempotent: removing an
    /// id that is already gone succeeds without effect.
    pub async fn remove(&self, action_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM pending_actions WHERE id = ?1")
            .bind(action_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(action_id = %action_id, "Remove on absent action (no-op)");
        }

        Ok(())
    }

    /// Bumps an action's attempt counter, returning the new count.
    pub async fn increment_attempts(&self, action_id: &str) -> DbResult<i64> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE pending_actions
            SET attempts = attempts + 1
            WHERE id = ?1
            RETURNING attempts
            "#,
        )
        .bind(action_id)
        .fetch_optional(&self.pool)
        .await?;

        attempts.ok_or_else(|| DbError::not_found("PendingAction", action_id))
    }

    /// Resets an action's attempt counter to zero (manual retry from the
    /// sync-errors screen).
    pub async fn reset_attempts(&self, action_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE pending_actions SET attempts = 0 WHERE id = ?1")
            .bind(action_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(action_id = %action_id, "Reset attempts on absent action");
            return Err(DbError::not_found("PendingAction", action_id));
        }

        Ok(())
    }

    /// Number of queued actions.
    pub async fn size(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Rewrites a confirmed provisional id across all remaining actions.
    ///
    /// After a CREATE succeeds, later queued actions in the same chain (and
    /// any action whose payload references the entity) must target the
    /// server-assigned id. Entity ids, chain ids, foreign references, and
    /// payload text are all rewritten in one statement.
    ///
    /// ## Returns
    /// Number of actions touched.
    pub async fn rewrite_provisional_id(&self, old_id: &str, new_id: &str) -> DbResult<u64> {
        debug!(old = %old_id, new = %new_id, "Rewriting provisional id in queue");

        let result = sqlx::query(
            r#"
            UPDATE pending_actions
            SET entity_id = REPLACE(entity_id, ?1, ?2),
                chain_id = REPLACE(chain_id, ?1, ?2),
                payload = REPLACE(payload, ?1, ?2),
                related_provisional_id = CASE
                    WHEN related_provisional_id = ?1 THEN NULL
                    ELSE related_provisional_id
                END
            WHERE entity_id = ?1
               OR chain_id = ?1
               OR related_provisional_id = ?1
               OR payload LIKE '%' || ?1 || '%'
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

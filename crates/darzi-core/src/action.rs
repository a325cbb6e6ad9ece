//! # Pending Actions
//!
//! Mutations queued while offline, replayed by the sync engine once
//! connectivity returns.
//!
//! ## Action Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pending Action Lifecycle                           │
//! │                                                                         │
//! │  Facade mutation (offline, or online call failed)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue ── durable row in pending_actions, FIFO by seq                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  drain ── replayed in enqueue order within its chain                   │
//! │       │                                                                 │
//! │       ├── success ──► removed (CREATE also records id mapping)         │
//! │       ├── retryable failure ──► attempts += 1, chain blocked           │
//! │       └── permanent failure ──► kept + surfaced, chain blocked         │
//! │                                                                         │
//! │  attempts >= max_attempts ──► never auto-removed; user must discard    │
//! │  or retry (reset_attempts) from the sync-errors screen                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Chains
//! `chain_id` is the entity's id at enqueue time. All actions touching one
//! entity share a chain and must replay strictly in order (a DELETE never
//! runs before its CREATE). Independent chains drain independently, so one
//! stuck mutation cannot block unrelated entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::ids;
use crate::types::EntityKind;
use crate::DEFAULT_MAX_ATTEMPTS;

// =============================================================================
// Action Type
// =============================================================================

/// The mutation a pending action replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionType::Create),
            "update" => Ok(ActionType::Update),
            "delete" => Ok(ActionType::Delete),
            other => Err(crate::CoreError::UnknownActionType(other.to_string())),
        }
    }
}

// =============================================================================
// Pending Action
// =============================================================================

/// A durably queued mutation the server does not know about yet.
///
/// The queue is the single source of truth for unsynced work; the sync
/// status's `pending_actions` count is derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingAction {
    /// Queue entry id (UUID v4, distinct from the entity's id).
    pub id: String,

    /// The mutation to replay.
    pub action: ActionType,

    /// Kind of entity the payload describes.
    pub kind: EntityKind,

    /// The entity's id at enqueue time (provisional for offline creates).
    pub entity_id: String,

    /// Full entity JSON for create/update; delete carries the id only.
    #[ts(type = "unknown")]
    pub payload: Value,

    /// Causal chain this action belongs to (the entity's id at enqueue
    /// time). Rewritten alongside entity ids during reconciliation.
    pub chain_id: String,

    /// Provisional id of a *different* entity referenced by the payload
    /// (e.g. a bill created offline against an offline-created customer).
    pub related_provisional_id: Option<String>,

    /// Replay attempts so far.
    pub attempts: i64,

    /// Ceiling after which the action is surfaced as a permanent failure.
    pub max_attempts: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    /// Builds a new action ready for enqueueing.
    pub fn new(
        action: ActionType,
        kind: EntityKind,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        let entity_id = entity_id.into();
        let related_provisional_id = find_foreign_provisional_id(&payload, &entity_id);

        PendingAction {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            kind,
            chain_id: entity_id.clone(),
            entity_id,
            payload,
            related_provisional_id,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
        }
    }

    /// Overrides the retry ceiling (from sync configuration).
    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// True once the action has used up its retry budget.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// True if the action targets an entity the server has never seen.
    #[inline]
    pub fn targets_provisional(&self) -> bool {
        ids::is_provisional(&self.entity_id)
    }
}

/// Scans a payload for a provisional id other than the entity's own.
///
/// Only string values are inspected; provisional ids never appear as object
/// keys in the wire format.
fn find_foreign_provisional_id(payload: &Value, own_id: &str) -> Option<String> {
    match payload {
        Value::String(s) if ids::is_provisional(s) && s != own_id => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_foreign_provisional_id(item, own_id)),
        Value::Object(map) => map
            .values()
            .find_map(|value| find_foreign_provisional_id(value, own_id)),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_type_round_trip() {
        for action in [ActionType::Create, ActionType::Update, ActionType::Delete] {
            let parsed: ActionType = action.to_string().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_new_action_assigns_chain_from_entity() {
        let action = PendingAction::new(
            ActionType::Create,
            EntityKind::Bill,
            "local-abc",
            json!({"id": "local-abc", "totalAmount": 500}),
        );
        assert_eq!(action.chain_id, "local-abc");
        assert_eq!(action.attempts, 0);
        assert!(!action.is_exhausted());
        assert!(action.targets_provisional());
    }

    #[test]
    fn test_detects_foreign_provisional_reference() {
        let action = PendingAction::new(
            ActionType::Create,
            EntityKind::Bill,
            "local-bill",
            json!({"id": "local-bill", "customerId": "local-customer"}),
        );
        assert_eq!(
            action.related_provisional_id.as_deref(),
            Some("local-customer")
        );

        // The entity's own provisional id is not a foreign reference.
        let action = PendingAction::new(
            ActionType::Create,
            EntityKind::Customer,
            "local-customer",
            json!({"id": "local-customer", "personalDetails": {"name": "Ahmed"}}),
        );
        assert_eq!(action.related_provisional_id, None);
    }

    #[test]
    fn test_exhaustion_respects_custom_ceiling() {
        let mut action = PendingAction::new(
            ActionType::Update,
            EntityKind::Service,
            "svc-1",
            json!({"id": "svc-1"}),
        )
        .with_max_attempts(2);

        action.attempts = 1;
        assert!(!action.is_exhausted());
        action.attempts = 2;
        assert!(action.is_exhausted());
    }
}

//! # Domain Types
//!
//! Core domain types used throughout Darzi.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Bill       │   │    Customer     │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  id             │       │
//! │  │  customer_id    │   │  personal_      │   │  bill_id (FK)   │       │
//! │  │  status         │   │    details      │   │  method         │       │
//! │  │  total_amount   │   │  measurements   │   │  amount         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │MeasurementConfig│   │    Service      │   │   EntityKind    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  garment_type   │   │  name           │   │  Bill           │       │
//! │  │  measurements[] │   │  default_price  │   │  Customer, ...  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity Pattern
//! Every entity carries a single string `id`. Entities created while offline
//! hold a provisional id (`local-` prefix, see [`crate::ids`]) until the sync
//! engine swaps in the server-assigned canonical id.
//!
//! Wire format is camelCase JSON, matching the billing backend.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids;

// =============================================================================
// Entity Kind
// =============================================================================

/// The kinds of records the app manages and syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A customer's bill (line items + total).
    Bill,
    /// A customer record with garment measurements.
    Customer,
    /// Per-garment-type measurement field configuration.
    MeasurementConfig,
    /// A service offered by the shop (stitching, alteration, ...).
    Service,
    /// A payment recorded against a bill.
    Payment,
}

impl EntityKind {
    /// All kinds, in a stable order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Bill,
        EntityKind::Customer,
        EntityKind::MeasurementConfig,
        EntityKind::Service,
        EntityKind::Payment,
    ];

    /// Stable lowercase name, used in cache keys and queue rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Bill => "bill",
            EntityKind::Customer => "customer",
            EntityKind::MeasurementConfig => "measurement_config",
            EntityKind::Service => "service",
            EntityKind::Payment => "payment",
        }
    }

    /// Cache key for a single record of this kind.
    pub fn record_key(&self, id: &str) -> String {
        format!("{}:{}", self.as_str(), id)
    }

    /// Cache key for the full list of this kind.
    pub fn list_key(&self) -> String {
        format!("{}:list", self.as_str())
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bill" => Ok(EntityKind::Bill),
            "customer" => Ok(EntityKind::Customer),
            "measurement_config" => Ok(EntityKind::MeasurementConfig),
            "service" => Ok(EntityKind::Service),
            "payment" => Ok(EntityKind::Payment),
            other => Err(crate::CoreError::UnknownEntityKind(other.to_string())),
        }
    }
}

// =============================================================================
// Offline Entity Trait
// =============================================================================

/// Behaviour every syncable record shares.
///
/// The offline-aware facade and the sync engine are generic over this trait;
/// per-entity code lives only in the thin typed handles.
pub trait OfflineEntity:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// The kind tag for this record type.
    const KIND: EntityKind;

    /// The record's identifier (provisional or canonical).
    fn id(&self) -> &str;

    /// Replaces the record's identifier (used when assigning a provisional
    /// id and when reconciling the canonical one).
    fn set_id(&mut self, id: String);

    /// Stamps creation/update timestamps for an optimistic local write.
    fn touch(&mut self, now: DateTime<Utc>);
}

// =============================================================================
// Bill
// =============================================================================

/// The status of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    /// Garments received, work not started.
    Pending,
    /// Work in progress.
    InProgress,
    /// Ready for pickup, payment may be outstanding.
    Ready,
    /// Picked up and fully paid.
    Delivered,
    /// Cancelled before delivery.
    Cancelled,
}

impl Default for BillStatus {
    fn default() -> Self {
        BillStatus::Pending
    }
}

/// A line item on a bill.
/// Snapshots the service name and price at billing time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    /// Service this line was billed from, if any.
    pub service_id: Option<String>,
    /// Garment type (links to a MeasurementConfig).
    pub garment_type: Option<String>,
    /// Free-text description shown on the bill.
    pub description: String,
    /// Quantity of garments.
    pub quantity: i64,
    /// Price per unit at billing time (whole rupees).
    pub unit_price: i64,
}

impl BillItem {
    /// Line total (unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> i64 {
        self.unit_price * self.quantity
    }
}

/// A customer's bill.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    /// Customer this bill belongs to. May be provisional if the customer
    /// was also created offline.
    pub customer_id: String,
    /// Date the garments were received (ISO date string from the UI).
    pub bill_date: String,
    /// Total in whole rupees.
    pub total_amount: i64,
    pub status: BillStatus,
    pub items: Vec<BillItem>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Sum of the line totals (may differ from `total_amount` when a manual
    /// discount was applied; validation only requires it to be non-negative).
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(BillItem::line_total).sum()
    }
}

impl OfflineEntity for Bill {
    const KIND: EntityKind = EntityKind::Bill;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at == DateTime::<Utc>::UNIX_EPOCH {
            self.created_at = now;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Contact details for a customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// A customer with stored garment measurements.
///
/// `measurements` maps garment type → measurement name → value, mirroring
/// the per-garment field lists in [`MeasurementConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub personal_details: PersonalDetails,
    #[ts(type = "Record<string, Record<string, string>>")]
    #[serde(default)]
    pub measurements:
        std::collections::BTreeMap<String, std::collections::BTreeMap<String, String>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Case-insensitive match over name, phone, and address.
    /// Mirrors the backend's universal customer search.
    pub fn matches_search(&self, text: &str) -> bool {
        let needle = text.to_lowercase();
        self.personal_details.name.to_lowercase().contains(&needle)
            || self.personal_details.phone.to_lowercase().contains(&needle)
            || self
                .personal_details
                .address
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(&needle))
    }
}

impl OfflineEntity for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at == DateTime::<Utc>::UNIX_EPOCH {
            self.created_at = now;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// Measurement Config
// =============================================================================

/// Measurement fields recorded for one garment type.
///
/// The garment type doubles as the identifier (the backend keys the table
/// by `garment_type`).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementConfig {
    /// Garment type, e.g. "shalwar-kameez", "sherwani". Acts as the id.
    pub garment_type: String,
    /// Ordered measurement field names, e.g. ["chest", "waist", "length"].
    pub measurements: Vec<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OfflineEntity for MeasurementConfig {
    const KIND: EntityKind = EntityKind::MeasurementConfig;

    fn id(&self) -> &str {
        &self.garment_type
    }

    fn set_id(&mut self, id: String) {
        self.garment_type = id;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at == DateTime::<Utc>::UNIX_EPOCH {
            self.created_at = now;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// Service
// =============================================================================

/// A service template the shop bills from (stitching, alteration, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Default price in whole rupees, pre-filled on new bill items.
    pub default_price: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OfflineEntity for Service {
    const KIND: EntityKind = EntityKind::Service;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at == DateTime::<Utc>::UNIX_EPOCH {
            self.created_at = now;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// Payment
// =============================================================================

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileWallet,
}

/// A payment recorded against a bill.
/// A bill can have multiple partial payments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    /// Bill this payment applies to. May be provisional if the bill was
    /// created offline in the same session.
    pub bill_id: String,
    /// Amount in whole rupees.
    pub amount: i64,
    pub method: PaymentMethod,
    /// Date of payment (ISO date string from the UI).
    pub payment_date: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OfflineEntity for Payment {
    const KIND: EntityKind = EntityKind::Payment;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at == DateTime::<Utc>::UNIX_EPOCH {
            self.created_at = now;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Returns true if the entity still carries a provisional id.
pub fn is_unconfirmed<T: OfflineEntity>(entity: &T) -> bool {
    ids::is_provisional(entity.id())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in EntityKind::ALL {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("garment".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(EntityKind::Bill.record_key("b-1"), "bill:b-1");
        assert_eq!(EntityKind::MeasurementConfig.list_key(), "measurement_config:list");
    }

    #[test]
    fn test_bill_items_total() {
        let bill = Bill {
            id: "b-1".into(),
            customer_id: "c-1".into(),
            bill_date: "2024-06-01".into(),
            total_amount: 4500,
            status: BillStatus::Pending,
            items: vec![
                BillItem {
                    service_id: None,
                    garment_type: Some("sherwani".into()),
                    description: "Stitching".into(),
                    quantity: 2,
                    unit_price: 2000,
                },
                BillItem {
                    service_id: None,
                    garment_type: None,
                    description: "Buttons".into(),
                    quantity: 1,
                    unit_price: 500,
                },
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(bill.items_total(), 4500);
    }

    #[test]
    fn test_customer_universal_search() {
        let customer = Customer {
            id: "c-1".into(),
            personal_details: PersonalDetails {
                name: "Ahmed Khan".into(),
                phone: "0300-1234567".into(),
                email: None,
                address: Some("Liberty Market, Lahore".into()),
            },
            measurements: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(customer.matches_search("ahmed"));
        assert!(customer.matches_search("1234"));
        assert!(customer.matches_search("lahore"));
        assert!(!customer.matches_search("karachi"));
    }

    #[test]
    fn test_bill_wire_format_is_camel_case() {
        let bill = Bill {
            id: "b-1".into(),
            customer_id: "c-1".into(),
            bill_date: "2024-06-01".into(),
            total_amount: 500,
            status: BillStatus::Pending,
            items: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&bill).unwrap();
        assert!(json.get("customerId").is_some());
        assert!(json.get("totalAmount").is_some());
        assert!(json.get("customer_id").is_none());
    }
}

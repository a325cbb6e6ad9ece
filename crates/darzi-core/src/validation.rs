//! # Validation Module
//!
//! Required-field validation for Darzi mutations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend forms (out of scope)                                │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Offline-aware facade (Rust)                                  │
//! │  └── THIS MODULE: the backend's required-field rules, enforced         │
//! │      BEFORE a mutation is cached or queued — a record that would be    │
//! │      rejected by the server must never sit in the action queue         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Server                                                       │
//! │  └── Authoritative validation (4xx → permanent sync error)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rules mirror the billing backend: a bill requires a customer, date and
//! status; a customer requires name and phone; a service requires a name and
//! a non-negative price; a measurement config requires a garment type and at
//! least one field.

use crate::error::ValidationError;
use crate::types::{Bill, Customer, MeasurementConfig, Payment, Service};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Entity Validators
// =============================================================================

/// Validates a bill before it is cached or queued.
///
/// ## Rules
/// - `customer_id`, `bill_date` must be present
/// - `total_amount` must not be negative
/// - every item needs a description and a positive quantity
pub fn validate_bill(bill: &Bill) -> ValidationResult<()> {
    require("customerId", &bill.customer_id)?;
    require("billDate", &bill.bill_date)?;

    if bill.total_amount < 0 {
        return Err(ValidationError::Negative {
            field: "totalAmount".to_string(),
        });
    }

    for item in &bill.items {
        require("items.description", &item.description)?;
        if item.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "items.quantity".to_string(),
            });
        }
        if item.unit_price < 0 {
            return Err(ValidationError::Negative {
                field: "items.unitPrice".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates a customer record.
///
/// ## Rules
/// - name and phone are required (the backend indexes both for search)
pub fn validate_customer(customer: &Customer) -> ValidationResult<()> {
    require("personalDetails.name", &customer.personal_details.name)?;
    require("personalDetails.phone", &customer.personal_details.phone)?;
    Ok(())
}

/// Validates a measurement configuration.
///
/// ## Rules
/// - garment type is required (it is the record's identity)
/// - at least one measurement field, none of them blank
pub fn validate_measurement_config(config: &MeasurementConfig) -> ValidationResult<()> {
    require("garmentType", &config.garment_type)?;

    if config.measurements.is_empty() {
        return Err(ValidationError::Empty {
            field: "measurements".to_string(),
        });
    }

    for field in &config.measurements {
        require("measurements", field)?;
    }

    Ok(())
}

/// Validates a service template.
///
/// ## Rules
/// - name is required; default price must not be negative
pub fn validate_service(service: &Service) -> ValidationResult<()> {
    require("name", &service.name)?;

    if service.default_price < 0 {
        return Err(ValidationError::Negative {
            field: "defaultPrice".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment.
///
/// ## Rules
/// - bill id and date are required; amount must be positive
pub fn validate_payment(payment: &Payment) -> ValidationResult<()> {
    require("billId", &payment.bill_id)?;
    require("paymentDate", &payment.payment_date)?;

    if payment.amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

//! Reason-code taxonomy and the ledger error model.
//!
//! Keep this focused on deterministic business failures (validation,
//! sequencing, period locks, missing dependencies). Infrastructure
//! concerns belong to the store layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type used across the domain layer.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Stable rejection codes surfaced to callers.
///
/// The string forms are part of the external contract and never change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "INVALID_PAYLOAD")]
    InvalidPayload,
    #[serde(rename = "INVALID_SEQUENCE")]
    InvalidSequence,
    #[serde(rename = "PERIOD_CLOSED")]
    PeriodClosed,
    #[serde(rename = "INVENTORY_CLOSED")]
    InventoryClosed,
    #[serde(rename = "PL_CLOSED")]
    PlClosed,
    #[serde(rename = "DUPLICATE_EVENT")]
    DuplicateEvent,
    #[serde(rename = "MISSING_DEPENDENCY")]
    MissingDependency,
    #[serde(rename = "INSUFFICIENT_STOCK")]
    InsufficientStock,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::InvalidSequence => "INVALID_SEQUENCE",
            Self::PeriodClosed => "PERIOD_CLOSED",
            Self::InventoryClosed => "INVENTORY_CLOSED",
            Self::PlClosed => "PL_CLOSED",
            Self::DuplicateEvent => "DUPLICATE_EVENT",
            Self::MissingDependency => "MISSING_DEPENDENCY",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
        }
    }

    /// HTTP-class mapping: 400 for malformed payloads, 403 for period
    /// locks, 409 for everything else (conflicts).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidPayload => 400,
            Self::PeriodClosed | Self::InventoryClosed | Self::PlClosed => 403,
            _ => 409,
        }
    }
}

impl core::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger processing error.
///
/// A closed sum over the reason-code taxonomy, carrying structured context
/// (the missing SKU, the offending account) instead of free-text codes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid payload: {detail}")]
    InvalidPayload { detail: String },

    #[error("missing required payload fields for {event_type}: {}", fields.join(", "))]
    MissingFields {
        event_type: String,
        fields: Vec<String>,
    },

    #[error("{event_type} requires a prior accepted {requires}")]
    InvalidSequence {
        event_type: String,
        requires: String,
    },

    #[error("accounting period is closed or missing: {detail}")]
    PeriodClosed { detail: String },

    #[error("inventory is closed for period {period_id}")]
    InventoryClosed { period_id: i64 },

    #[error("P&L is closed for period {period_id}")]
    PlClosed { period_id: i64 },

    #[error("event {event_id} was already processed")]
    DuplicateEvent { event_id: Uuid },

    #[error("product with SKU {sku} not found")]
    MissingProduct { sku: String },

    #[error("sales order {order_number} not found")]
    MissingOrder { order_number: String },

    #[error("no order line for SKU {sku}")]
    MissingOrderLine { sku: String },

    #[error("insufficient stock for SKU {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: f64,
        available: f64,
    },

    #[error("journal not balanced: debit {total_debit} != credit {total_credit}")]
    UnbalancedJournal { total_debit: f64, total_credit: f64 },

    #[error("journal line for {account} has both debit and credit")]
    LineDebitAndCredit { account: String },
}

impl LedgerError {
    pub fn invalid_payload(detail: impl Into<String>) -> Self {
        Self::InvalidPayload {
            detail: detail.into(),
        }
    }

    pub fn period_closed(detail: impl Into<String>) -> Self {
        Self::PeriodClosed {
            detail: detail.into(),
        }
    }

    /// Map every variant onto the stable reason-code taxonomy.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::InvalidPayload { .. }
            | Self::MissingFields { .. }
            | Self::UnbalancedJournal { .. }
            | Self::LineDebitAndCredit { .. } => ReasonCode::InvalidPayload,
            Self::InvalidSequence { .. } => ReasonCode::InvalidSequence,
            Self::PeriodClosed { .. } => ReasonCode::PeriodClosed,
            Self::InventoryClosed { .. } => ReasonCode::InventoryClosed,
            Self::PlClosed { .. } => ReasonCode::PlClosed,
            Self::DuplicateEvent { .. } => ReasonCode::DuplicateEvent,
            Self::MissingProduct { .. }
            | Self::MissingOrder { .. }
            | Self::MissingOrderLine { .. } => ReasonCode::MissingDependency,
            Self::InsufficientStock { .. } => ReasonCode::InsufficientStock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_keep_their_wire_strings() {
        assert_eq!(ReasonCode::InvalidPayload.as_str(), "INVALID_PAYLOAD");
        assert_eq!(ReasonCode::PlClosed.as_str(), "PL_CLOSED");
    }

    #[test]
    fn http_class_mapping() {
        assert_eq!(ReasonCode::InvalidPayload.http_status(), 400);
        assert_eq!(ReasonCode::PeriodClosed.http_status(), 403);
        assert_eq!(ReasonCode::InventoryClosed.http_status(), 403);
        assert_eq!(ReasonCode::PlClosed.http_status(), 403);
        assert_eq!(ReasonCode::InvalidSequence.http_status(), 409);
        assert_eq!(ReasonCode::DuplicateEvent.http_status(), 409);
        assert_eq!(ReasonCode::MissingDependency.http_status(), 409);
    }

    #[test]
    fn errors_map_to_their_reason_codes() {
        assert_eq!(
            LedgerError::MissingProduct {
                sku: "SKU-1".into()
            }
            .reason_code(),
            ReasonCode::MissingDependency
        );
        assert_eq!(
            LedgerError::UnbalancedJournal {
                total_debit: 10.0,
                total_credit: 9.0
            }
            .reason_code(),
            ReasonCode::InvalidPayload
        );
        assert_eq!(
            LedgerError::PlClosed { period_id: 3 }.reason_code(),
            ReasonCode::PlClosed
        );
    }
}

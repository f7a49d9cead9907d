//! The Anchor event envelope: the seven supported event types, schema and
//! required-field validation, and typed payload accessors.

use anchorledger_accounting::PostingImpact;
use anchorledger_core::{LedgerError, LedgerResult};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The seven supported order-lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderConfirmed,
    GoodsShipped,
    GoodsDelivered,
    PaymentReceived,
    ReturnRequested,
    GoodsReturned,
    RefundSettled,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        Self::OrderConfirmed,
        Self::GoodsShipped,
        Self::GoodsDelivered,
        Self::PaymentReceived,
        Self::ReturnRequested,
        Self::GoodsReturned,
        Self::RefundSettled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderConfirmed => "ORDER_CONFIRMED",
            Self::GoodsShipped => "GOODS_SHIPPED",
            Self::GoodsDelivered => "GOODS_DELIVERED",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::ReturnRequested => "RETURN_REQUESTED",
            Self::GoodsReturned => "GOODS_RETURNED",
            Self::RefundSettled => "REFUND_SETTLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Required payload keys per event type.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::OrderConfirmed => {
                &["order_id", "order_date", "customer_id", "currency", "order_lines"]
            }
            Self::GoodsShipped => {
                &["order_id", "shipment_id", "ship_date", "warehouse_id", "items"]
            }
            Self::GoodsDelivered => &["order_id", "delivery_id", "delivery_date", "items"],
            Self::PaymentReceived => {
                &["order_id", "payment_id", "payment_date", "amount", "method"]
            }
            Self::ReturnRequested => &["order_id", "return_id", "request_date"],
            Self::GoodsReturned => {
                &["order_id", "return_id", "return_date", "warehouse_id", "items"]
            }
            Self::RefundSettled => {
                &["order_id", "refund_id", "refund_date", "amount", "method"]
            }
        }
    }

    /// The event that must have been accepted first for the same order, if
    /// any. `ORDER_CONFIRMED` and `PAYMENT_RECEIVED` have no predecessor.
    pub fn predecessor(&self) -> Option<EventType> {
        match self {
            Self::GoodsShipped => Some(Self::OrderConfirmed),
            Self::GoodsDelivered => Some(Self::GoodsShipped),
            Self::GoodsReturned | Self::RefundSettled | Self::ReturnRequested => {
                Some(Self::GoodsDelivered)
            }
            Self::OrderConfirmed | Self::PaymentReceived => None,
        }
    }

    /// Which sub-ledgers this event posts into; drives the period guard.
    pub fn impact(&self) -> PostingImpact {
        PostingImpact {
            inventory: matches!(self, Self::GoodsShipped | Self::GoodsReturned),
            profit_and_loss: matches!(self, Self::GoodsDelivered | Self::GoodsReturned),
            cash: matches!(self, Self::PaymentReceived | Self::RefundSettled),
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One shipped/delivered/returned item reference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventItem {
    pub sku: String,
    #[serde(default)]
    pub qty: f64,
}

/// One confirmed order line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderLineInput {
    pub sku: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub unit_price: f64,
}

/// A validated event envelope.
///
/// [`AnchorEvent::parse`] performs schema validation (UUID event id,
/// supported type, RFC3339 time with offset, object payload) and the
/// per-type required-field check; both fail with `INVALID_PAYLOAD`-class
/// errors. Typed accessors re-validate payload shape on access so the
/// dispatcher stays safe when invoked without the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub event_time: DateTime<FixedOffset>,
    pub payload: Map<String, Value>,
}

impl AnchorEvent {
    pub fn parse(raw: &Value) -> LedgerResult<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| LedgerError::invalid_payload("envelope must be a JSON object"))?;

        let event_id = obj
            .get("event_id")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::invalid_payload("event_id is required"))
            .and_then(|s| {
                Uuid::parse_str(s)
                    .map_err(|_| LedgerError::invalid_payload("event_id must be a UUID"))
            })?;

        let event_type = obj
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::invalid_payload("event_type is required"))
            .and_then(|s| {
                EventType::parse(s).ok_or_else(|| {
                    LedgerError::invalid_payload(format!("unsupported event_type {s}"))
                })
            })?;

        let event_time = obj
            .get("event_time")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::invalid_payload("event_time is required"))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|_| {
                    LedgerError::invalid_payload("event_time must be RFC3339 with offset")
                })
            })?;

        let payload = obj
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| LedgerError::invalid_payload("payload must be an object"))?;

        let missing: Vec<String> = event_type
            .required_fields()
            .iter()
            .filter(|key| payload.get(**key).is_none_or(Value::is_null))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LedgerError::MissingFields {
                event_type: event_type.as_str().to_string(),
                fields: missing,
            });
        }

        Ok(Self {
            event_id,
            event_type,
            event_time,
            payload,
        })
    }

    /// The event date in the ledger's calendar (used for period lookup and
    /// journal entry dates).
    pub fn event_date(&self) -> NaiveDate {
        self.event_time.date_naive()
    }

    pub fn order_id(&self) -> LedgerResult<String> {
        match self.payload.get("order_id") {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(LedgerError::invalid_payload("payload.order_id is required")),
        }
    }

    pub fn amount(&self) -> LedgerResult<f64> {
        self.payload
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| LedgerError::invalid_payload("amount is required"))
    }

    pub fn warehouse_id(&self) -> LedgerResult<i64> {
        match self.payload.get("warehouse_id") {
            Some(Value::Number(n)) if n.as_i64().is_some() => Ok(n.as_i64().unwrap_or(0)),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| LedgerError::invalid_payload("warehouse_id must be an integer")),
            _ => Err(LedgerError::invalid_payload("warehouse_id is required")),
        }
    }

    pub fn customer_id(&self) -> Option<String> {
        self.payload
            .get("customer_id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// `payload.order_date` when present and parseable, else the event date.
    pub fn order_date(&self) -> NaiveDate {
        self.payload
            .get("order_date")
            .and_then(Value::as_str)
            .and_then(|s| {
                NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d").ok()
            })
            .unwrap_or_else(|| self.event_date())
    }

    pub fn items(&self) -> LedgerResult<Vec<EventItem>> {
        self.non_empty_array("items")
    }

    pub fn order_lines(&self) -> LedgerResult<Vec<OrderLineInput>> {
        self.non_empty_array("order_lines")
    }

    fn non_empty_array<T: serde::de::DeserializeOwned>(&self, key: &str) -> LedgerResult<Vec<T>> {
        let value = self
            .payload
            .get(key)
            .filter(|v| v.is_array())
            .ok_or_else(|| {
                LedgerError::invalid_payload(format!("{key} must be a non-empty array"))
            })?;

        let parsed: Vec<T> = serde_json::from_value(value.clone())
            .map_err(|e| LedgerError::invalid_payload(format!("invalid {key}: {e}")))?;
        if parsed.is_empty() {
            return Err(LedgerError::invalid_payload(format!(
                "{key} must be a non-empty array"
            )));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, payload: Value) -> Value {
        json!({
            "event_id": "0195f1f4-0000-7000-8000-000000000001",
            "event_type": event_type,
            "event_time": "2025-06-02T10:00:00+07:00",
            "payload": payload,
        })
    }

    #[test]
    fn wire_names_round_trip() {
        for t in EventType::ALL {
            assert_eq!(EventType::parse(t.as_str()), Some(t));
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }

    #[test]
    fn parse_accepts_a_complete_envelope() {
        let raw = envelope(
            "PAYMENT_RECEIVED",
            json!({
                "order_id": "SO-1001",
                "payment_id": "PAY-1",
                "payment_date": "2025-06-02",
                "amount": 60.0,
                "method": "bank_transfer",
            }),
        );
        let event = AnchorEvent::parse(&raw).unwrap();
        assert_eq!(event.event_type, EventType::PaymentReceived);
        assert_eq!(event.event_date(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_eq!(event.order_id().unwrap(), "SO-1001");
        assert_eq!(event.amount().unwrap(), 60.0);
    }

    #[test]
    fn bad_uuid_and_bad_time_are_invalid_payload() {
        let mut raw = envelope("PAYMENT_RECEIVED", json!({}));
        raw["event_id"] = json!("not-a-uuid");
        assert!(matches!(
            AnchorEvent::parse(&raw).unwrap_err(),
            LedgerError::InvalidPayload { .. }
        ));

        let mut raw = envelope("PAYMENT_RECEIVED", json!({}));
        raw["event_time"] = json!("2025-06-02");
        assert!(matches!(
            AnchorEvent::parse(&raw).unwrap_err(),
            LedgerError::InvalidPayload { .. }
        ));
    }

    #[test]
    fn unsupported_event_type_is_rejected() {
        let raw = envelope("ORDER_CANCELLED", json!({"order_id": "SO-1"}));
        assert!(AnchorEvent::parse(&raw).is_err());
    }

    #[test]
    fn missing_required_fields_are_reported_by_name() {
        let raw = envelope("GOODS_SHIPPED", json!({"order_id": "SO-1001"}));
        match AnchorEvent::parse(&raw).unwrap_err() {
            LedgerError::MissingFields { event_type, fields } => {
                assert_eq!(event_type, "GOODS_SHIPPED");
                assert_eq!(
                    fields,
                    vec!["shipment_id", "ship_date", "warehouse_id", "items"]
                );
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn null_fields_count_as_missing() {
        let raw = envelope(
            "RETURN_REQUESTED",
            json!({"order_id": "SO-1", "return_id": null, "request_date": "2025-06-03"}),
        );
        assert!(matches!(
            AnchorEvent::parse(&raw).unwrap_err(),
            LedgerError::MissingFields { .. }
        ));
    }

    #[test]
    fn sequencing_rules() {
        assert_eq!(EventType::OrderConfirmed.predecessor(), None);
        assert_eq!(EventType::PaymentReceived.predecessor(), None);
        assert_eq!(
            EventType::GoodsShipped.predecessor(),
            Some(EventType::OrderConfirmed)
        );
        assert_eq!(
            EventType::GoodsDelivered.predecessor(),
            Some(EventType::GoodsShipped)
        );
        for t in [
            EventType::GoodsReturned,
            EventType::RefundSettled,
            EventType::ReturnRequested,
        ] {
            assert_eq!(t.predecessor(), Some(EventType::GoodsDelivered));
        }
    }

    #[test]
    fn impact_classification() {
        assert!(EventType::GoodsShipped.impact().inventory);
        assert!(!EventType::GoodsShipped.impact().profit_and_loss);
        assert!(EventType::GoodsDelivered.impact().profit_and_loss);
        assert!(EventType::GoodsReturned.impact().inventory);
        assert!(EventType::GoodsReturned.impact().profit_and_loss);
        assert!(EventType::PaymentReceived.impact().cash);
        assert!(EventType::RefundSettled.impact().cash);
        assert_eq!(EventType::OrderConfirmed.impact(), PostingImpact::default());
    }

    #[test]
    fn items_must_be_a_non_empty_array() {
        let raw = envelope(
            "GOODS_SHIPPED",
            json!({
                "order_id": "SO-1",
                "shipment_id": "SHIP-1",
                "ship_date": "2025-06-02",
                "warehouse_id": 1,
                "items": [],
            }),
        );
        let event = AnchorEvent::parse(&raw).unwrap();
        assert!(event.items().is_err());
    }
}

//! Append-only event audit log.
//!
//! Exactly one row per distinct event outcome. The receiver's sequencing
//! gate reads this log ("has an ACCEPTED entry for this order + type").

use anchorledger_core::ReasonCode;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::envelope::EventType;

/// Terminal outcome of processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    Accepted,
    Rejected,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// One audit-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub event_id: Uuid,
    pub idempotency_key: String,
    pub event_type: EventType,
    pub event_time: DateTime<FixedOffset>,
    /// Order the event belongs to, when the payload named one.
    pub order_id: Option<String>,
    pub payload: Value,
    pub outcome: EventOutcome,
    pub reason_code: Option<ReasonCode>,
    pub message: Option<String>,
}

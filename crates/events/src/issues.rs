//! Operator-facing rejection text: a default human message and suggested
//! next action per reason code, plus trace links into the order timeline.

use anchorledger_core::ReasonCode;
use uuid::Uuid;

/// Default human-readable explanation for a rejection.
pub fn human_message(code: ReasonCode) -> &'static str {
    match code {
        ReasonCode::PeriodClosed => {
            "The accounting period is closed. Forward adjustment required."
        }
        ReasonCode::InventoryClosed => {
            "Inventory period is closed. Forward adjustment required."
        }
        ReasonCode::PlClosed => {
            "P&L period is closed. Revenue/COGS posting blocked. Forward adjustment required."
        }
        ReasonCode::InvalidSequence => {
            "This step arrived out of order. A prior event is missing."
        }
        ReasonCode::MissingDependency => {
            "The referenced record is missing (order/product/warehouse)."
        }
        ReasonCode::DuplicateEvent => {
            "This event was already processed. No further action taken."
        }
        ReasonCode::InsufficientStock => {
            "Not enough stock to move the requested quantity."
        }
        ReasonCode::InvalidPayload => "The event payload is incomplete or invalid.",
    }
}

/// Default remediation hint for a rejection.
pub fn suggested_next_action(code: ReasonCode) -> &'static str {
    match code {
        ReasonCode::PeriodClosed => {
            "Period is closed. Post correction in next period as a forward adjustment."
        }
        ReasonCode::InventoryClosed => {
            "Inventory is closed. Post correction in next period or reopen per finance policy."
        }
        ReasonCode::PlClosed => {
            "Revenue/COGS blocked. Post correction in next period and reference original date."
        }
        ReasonCode::InvalidSequence => {
            "Send the missing prior event (e.g., confirm → ship → deliver) before retrying."
        }
        ReasonCode::MissingDependency => "Create or sync the missing record, then resend.",
        ReasonCode::DuplicateEvent => {
            "Do not resend. Review the trace to confirm downstream impact."
        }
        ReasonCode::InsufficientStock => {
            "Adjust quantity or receive stock before sending this movement."
        }
        ReasonCode::InvalidPayload => {
            "Fix the payload fields listed in the message, then resend."
        }
    }
}

/// Trace link for a rejection: prefer the order timeline, fall back to the
/// event itself.
pub fn trace_path(order_id: Option<&str>, event_id: Uuid) -> String {
    match order_id {
        Some(order_id) if !order_id.is_empty() => {
            format!("/erp/trace/order/{order_id}")
        }
        _ => format!("/erp/trace/event/{event_id}"),
    }
}

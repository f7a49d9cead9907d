//! Event receiver: decides ACCEPT/REJECT for one inbound event.
//!
//! The receiver validates the envelope, enforces per-order sequencing and
//! the period guard, then hands the event to the dispatcher. Its only
//! ledger writes are audit-log rows; every rejection after envelope
//! validation is recorded. Envelope-level failures (bad schema, missing
//! fields) are rejected without a log row since there is nothing reliable
//! to key the row on.

use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use anchorledger_accounting::check_period;
use anchorledger_core::{Clock, EntryNumberGenerator, LedgerError, ReasonCode};
use anchorledger_events::{issues, AnchorEvent, EventLogEntry, EventOutcome};

use crate::dispatcher::{apply_event, EventError};
use crate::store::{LedgerStore, LedgerUow, StoreError, StoredResponse};

/// Outcome of processing one event, including the wire response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub status_code: u16,
    pub outcome: EventOutcome,
    pub reason_code: Option<ReasonCode>,
    pub period_id: Option<i64>,
    pub body: Value,
}

impl ProcessResult {
    pub fn accepted(&self) -> bool {
        self.outcome == EventOutcome::Accepted
    }

    fn to_stored(&self) -> StoredResponse {
        StoredResponse {
            status_code: self.status_code,
            outcome: self.outcome,
            body: self.body.clone(),
        }
    }

    /// A memoized response replayed for a repeated idempotency key. The
    /// structured rejection context is not rehydrated; the body carries it.
    fn from_stored(stored: StoredResponse) -> Self {
        Self {
            status_code: stored.status_code,
            outcome: stored.outcome,
            reason_code: None,
            period_id: None,
            body: stored.body,
        }
    }
}

fn rejection(
    err: &LedgerError,
    event_id: Option<Uuid>,
    order_id: Option<&str>,
    period_id: Option<i64>,
) -> ProcessResult {
    let code = err.reason_code();
    let mut body = json!({
        "success": false,
        "status": "REJECTED",
        "event_id": event_id.map(|id| id.to_string()),
        "reference_id": event_id.map(|id| id.to_string()),
        "error_code": code.as_str(),
        "human_message": err.to_string(),
        "suggested_next_action": issues::suggested_next_action(code),
    });
    if let Some(event_id) = event_id {
        body["trace_path"] = json!(issues::trace_path(order_id, event_id));
    }

    ProcessResult {
        status_code: code.http_status(),
        outcome: EventOutcome::Rejected,
        reason_code: Some(code),
        period_id,
        body,
    }
}

fn log_entry(
    event: &AnchorEvent,
    idempotency_key: &str,
    order_id: Option<&str>,
    outcome: EventOutcome,
    err: Option<&LedgerError>,
) -> EventLogEntry {
    EventLogEntry {
        event_id: event.event_id,
        idempotency_key: idempotency_key.to_string(),
        event_type: event.event_type,
        event_time: event.event_time,
        order_id: order_id.map(str::to_string),
        payload: Value::Object(event.payload.clone()),
        outcome,
        reason_code: err.map(LedgerError::reason_code),
        message: err.map(ToString::to_string),
    }
}

/// Process one event end to end.
///
/// Business rejections come back as `Ok(ProcessResult)` with outcome
/// REJECTED; only infrastructure failures surface as `Err`.
#[instrument(skip_all, fields(idempotency_key))]
pub async fn receive_event<S: LedgerStore>(
    store: &S,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    raw: &Value,
    idempotency_key: &str,
) -> Result<ProcessResult, StoreError> {
    // Envelope validation. No log row: a malformed envelope has no
    // trustworthy event identity to key it on.
    let event = match AnchorEvent::parse(raw) {
        Ok(event) => event,
        Err(err) => {
            let event_id = raw
                .get("event_id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok());
            let order_id = raw
                .pointer("/payload/order_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            warn!(error = %err, "envelope rejected");
            return Ok(rejection(&err, event_id, order_id.as_deref(), None));
        }
    };

    let mut uow = store.begin().await?;

    // Sequencing gate: the predecessor event must already be ACCEPTED for
    // the same order.
    let order_id = match event.order_id() {
        Ok(order_id) => order_id,
        Err(err) => {
            return reject_logged(uow, &event, idempotency_key, None, None, err).await;
        }
    };
    if let Some(required) = event.event_type.predecessor() {
        if !uow.has_accepted_event(&order_id, required).await? {
            let err = LedgerError::InvalidSequence {
                event_type: event.event_type.as_str().to_string(),
                requires: required.as_str().to_string(),
            };
            return reject_logged(uow, &event, idempotency_key, Some(&order_id), None, err)
                .await;
        }
    }

    // Period guard.
    let period = uow.period_for_date(event.event_date()).await?;
    let period_id = period.as_ref().map(|p| p.id);
    if let Err(err) = check_period(period.as_ref(), event.event_type.impact()) {
        return reject_logged(uow, &event, idempotency_key, Some(&order_id), period_id, err)
            .await;
    }

    // Apply. A domain failure rolls back the dispatch uow; the log row is
    // written on a fresh one so it survives.
    match apply_event(&mut uow, entry_numbers, clock, &event).await {
        Ok(()) => {}
        Err(EventError::Domain(err)) => {
            drop(uow);
            let uow = store.begin().await?;
            return reject_logged(uow, &event, idempotency_key, Some(&order_id), period_id, err)
                .await;
        }
        Err(EventError::Store(err)) => return Err(err),
    }

    uow.append_event_log(&log_entry(
        &event,
        idempotency_key,
        Some(&order_id),
        EventOutcome::Accepted,
        None,
    ))
    .await?;
    uow.commit().await?;

    info!(event_id = %event.event_id, event_type = %event.event_type, "event accepted");
    Ok(ProcessResult {
        status_code: 200,
        outcome: EventOutcome::Accepted,
        reason_code: None,
        period_id,
        body: json!({
            "success": true,
            "status": "ACCEPTED",
            "event_id": event.event_id.to_string(),
            "processed_at": clock.now().to_rfc3339(),
        }),
    })
}

async fn reject_logged<U: LedgerUow>(
    mut uow: U,
    event: &AnchorEvent,
    idempotency_key: &str,
    order_id: Option<&str>,
    period_id: Option<i64>,
    err: LedgerError,
) -> Result<ProcessResult, StoreError> {
    warn!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        reason = %err.reason_code(),
        "event rejected"
    );
    uow.append_event_log(&log_entry(
        event,
        idempotency_key,
        order_id,
        EventOutcome::Rejected,
        Some(&err),
    ))
    .await?;
    uow.commit().await?;
    Ok(rejection(&err, Some(event.event_id), order_id, period_id))
}

/// Idempotency-key wrapper: the same key always yields the same response,
/// and only the first presentation processes the event.
pub async fn receive_once<S: LedgerStore>(
    store: &S,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    raw: &Value,
    idempotency_key: &str,
) -> Result<ProcessResult, StoreError> {
    let mut uow = store.begin().await?;
    if let Some(stored) = uow.response_for_key(idempotency_key).await? {
        info!(idempotency_key, "replaying memoized response");
        return Ok(ProcessResult::from_stored(stored));
    }
    drop(uow);

    let result = receive_event(store, entry_numbers, clock, raw, idempotency_key).await?;

    let mut uow = store.begin().await?;
    uow.record_response(idempotency_key, &result.to_stored())
        .await?;
    uow.commit().await?;
    Ok(result)
}

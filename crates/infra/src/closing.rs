//! Cash/bank period closer.
//!
//! A single gated, irreversible transition: OPEN(cash_closed=false) to
//! OPEN(cash_closed=true). Every check must pass before anything mutates;
//! a blocked close returns the full per-check map and writes nothing. A
//! successful close flips the flag and appends one audit row carrying a
//! content-addressed snapshot of the ending balances.

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument};

use anchorledger_accounting::{AccountBalanceRow, AccountingPeriod};
use anchorledger_core::Clock;

use crate::store::{
    AccountSelector, BalanceQuery, BankReconciliationStatus, LedgerUow, NewCloseAudit,
    StoreError,
};

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("accounting period {0} not found")]
    PeriodNotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One close-readiness check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub pass: bool,
    pub message: String,
    pub details: Value,
}

impl CheckResult {
    fn pass(message: impl Into<String>, details: Value) -> Self {
        Self {
            pass: true,
            message: message.into(),
            details,
        }
    }

    fn fail(message: impl Into<String>, details: Value) -> Self {
        Self {
            pass: false,
            message: message.into(),
            details,
        }
    }
}

/// The full validation battery, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChecks {
    pub customer_receipts_posted: CheckResult,
    pub supplier_payments_posted: CheckResult,
    pub no_draft_cash_bank: CheckResult,
    pub clearing_zero: CheckResult,
    pub internal_transfers_balanced: CheckResult,
    pub bank_reconciled: CheckResult,
    pub not_already_closed: CheckResult,
}

impl CloseChecks {
    pub fn all_pass(&self) -> bool {
        self.customer_receipts_posted.pass
            && self.supplier_payments_posted.pass
            && self.no_draft_cash_bank.pass
            && self.clearing_zero.pass
            && self.internal_transfers_balanced.pass
            && self.bank_reconciled.pass
            && self.not_already_closed.pass
    }
}

/// Ending balance of one cash/bank account as of period end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndingBalance {
    pub account_id: i64,
    pub account_name: String,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseValidation {
    pub can_close: bool,
    pub checks: CloseChecks,
    pub period: AccountingPeriod,
    pub ending_balances: Vec<EndingBalance>,
    pub clearing_balance: f64,
}

/// A successful close: what was written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseOutcome {
    pub period_id: i64,
    pub closed_by: String,
    pub snapshot: Value,
    pub snapshot_hash: String,
}

/// Result of a close attempt. `Blocked` carries the full validation so
/// callers can show every failing check at once.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseDecision {
    Closed(CloseOutcome),
    Blocked(CloseValidation),
}

async fn signed_sum<U: LedgerUow>(
    uow: &mut U,
    query: &BalanceQuery,
    selector: AccountSelector,
) -> Result<f64, StoreError> {
    let rows = uow.account_balances(query).await?;
    Ok(rows
        .iter()
        .filter(|row| selector.matches(&row.account))
        .map(AccountBalanceRow::signed_amount)
        .sum())
}

async fn draft_check<U: LedgerUow>(
    uow: &mut U,
    period: &AccountingPeriod,
    selector: AccountSelector,
    pass_message: &str,
    noun: &str,
) -> Result<CheckResult, StoreError> {
    let count = uow.draft_line_count(&period.range(), selector).await?;
    Ok(if count == 0 {
        CheckResult::pass(pass_message, json!({ "draftCount": 0 }))
    } else {
        CheckResult::fail(
            format!("{count} draft {noun} journal line(s)"),
            json!({ "draftCount": count }),
        )
    })
}

/// Run the close-readiness battery for a period without mutating anything.
#[instrument(skip(uow))]
pub async fn validate_cash_close<U: LedgerUow>(
    uow: &mut U,
    period_id: i64,
) -> Result<CloseValidation, CloseError> {
    let period = uow
        .period_by_id(period_id)
        .await?
        .ok_or(CloseError::PeriodNotFound(period_id))?;
    let range = period.range();

    let customer_receipts_posted = draft_check(
        uow,
        &period,
        AccountSelector::Receivable,
        "Customer receipts posted",
        "receipt",
    )
    .await?;
    let supplier_payments_posted = draft_check(
        uow,
        &period,
        AccountSelector::Payable,
        "Supplier payments posted",
        "payment",
    )
    .await?;
    let no_draft_cash_bank = draft_check(
        uow,
        &period,
        AccountSelector::CashOrBank,
        "No draft cash/bank journals",
        "cash/bank",
    )
    .await?;

    let as_of_end = BalanceQuery::as_of(&[], period.end_date);
    let clearing_balance = signed_sum(uow, &as_of_end, AccountSelector::Clearing).await?;
    let clearing_zero = if clearing_balance.abs() < 0.01 {
        CheckResult::pass("Clearing accounts zeroed", json!({ "balance": clearing_balance }))
    } else {
        CheckResult::fail(
            format!("Clearing balance {clearing_balance}"),
            json!({ "balance": clearing_balance }),
        )
    };

    // Pure cash/bank-to-cash/bank journals must net to zero on their cash
    // side.
    let profiles = uow.journal_cash_profiles(&range).await?;
    let unbalanced: Vec<Value> = profiles
        .iter()
        .filter(|p| p.non_cash_lines == 0 && p.cash_delta.abs() >= 0.01)
        .map(|p| {
            json!({
                "entry_id": p.entry_id,
                "entry_number": p.entry_number,
                "delta": p.cash_delta,
            })
        })
        .collect();
    let internal_transfers_balanced = if unbalanced.is_empty() {
        CheckResult::pass("Internal transfers balanced", json!([]))
    } else {
        CheckResult::fail(
            format!("{} transfer(s) off by delta", unbalanced.len()),
            Value::Array(unbalanced),
        )
    };

    let bank_reconciled = match uow.latest_bank_reconciliation(period.id).await? {
        BankReconciliationStatus::TableMissing => {
            CheckResult::pass("Bank reconciliation table absent (skipped)", json!({}))
        }
        BankReconciliationStatus::NotFound => {
            CheckResult::fail("Bank reconciliation missing", json!({}))
        }
        BankReconciliationStatus::Found { status, explanation } => {
            let ok = matches!(status.to_uppercase().as_str(), "COMPLETED" | "EXPLAINED")
                || explanation.as_deref().is_some_and(|e| !e.is_empty());
            let details = json!({ "status": status, "explanation": explanation });
            if ok {
                CheckResult::pass("Bank reconciliation completed/explained", details)
            } else {
                CheckResult::fail("Bank reconciliation not completed", details)
            }
        }
    };

    let not_already_closed = if period.cash_closed {
        CheckResult::fail("Cash/Bank already closed", json!({ "cash_closed": true }))
    } else {
        CheckResult::pass("Cash/Bank open", json!({ "cash_closed": false }))
    };

    let ending_balances: Vec<EndingBalance> = uow
        .account_balances(&as_of_end)
        .await?
        .iter()
        .filter(|row| AccountSelector::CashOrBank.matches(&row.account))
        .map(|row| EndingBalance {
            account_id: row.account.id,
            account_name: row.account.name.clone(),
            balance: row.signed_amount(),
        })
        .collect();

    let checks = CloseChecks {
        customer_receipts_posted,
        supplier_payments_posted,
        no_draft_cash_bank,
        clearing_zero,
        internal_transfers_balanced,
        bank_reconciled,
        not_already_closed,
    };

    Ok(CloseValidation {
        can_close: checks.all_pass(),
        checks,
        period,
        ending_balances,
        clearing_balance,
    })
}

/// Attempt to close the cash/bank sub-ledger for a period.
///
/// The period row is locked for the duration of the caller's transaction,
/// so two concurrent close attempts serialize and the loser sees
/// `cash_closed = true` during validation.
#[instrument(skip(uow, clock))]
pub async fn close_cash_period<U: LedgerUow>(
    uow: &mut U,
    period_id: i64,
    closed_by: &str,
    clock: &dyn Clock,
) -> Result<CloseDecision, CloseError> {
    uow.lock_period(period_id)
        .await
        .map_err(|err| match err {
            StoreError::NotFound(_) => CloseError::PeriodNotFound(period_id),
            other => CloseError::Store(other),
        })?;

    let validation = validate_cash_close(uow, period_id).await?;
    if !validation.can_close {
        return Ok(CloseDecision::Blocked(validation));
    }

    let closed_at = clock.now();
    let snapshot = json!({
        "period_id": validation.period.id,
        "period_name": validation.period.name,
        "ending_balances": validation.ending_balances,
        "clearing_balance": validation.clearing_balance,
        "validation": validation.checks,
        "computed_at": closed_at.to_rfc3339(),
    });
    let snapshot_hash = hex::encode(Sha256::digest(serde_json::to_vec(&snapshot).map_err(
        |e| CloseError::Store(StoreError::Backend(e.to_string())),
    )?));

    uow.mark_cash_closed(period_id, closed_by, closed_at).await?;
    uow.insert_close_audit(&NewCloseAudit {
        period_id,
        closed_by: closed_by.to_string(),
        snapshot: snapshot.clone(),
        snapshot_hash: snapshot_hash.clone(),
        validation: serde_json::to_value(&validation.checks)
            .map_err(|e| CloseError::Store(StoreError::Backend(e.to_string())))?,
    })
    .await?;

    info!(period_id, closed_by, %snapshot_hash, "cash/bank period closed");
    Ok(CloseDecision::Closed(CloseOutcome {
        period_id,
        closed_by: closed_by.to_string(),
        snapshot,
        snapshot_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, MemoryLedger};
    use anchorledger_accounting::PeriodStatus;
    use anchorledger_core::FixedClock;
    use chrono::{DateTime, NaiveDate, Utc};

    fn june() -> AccountingPeriod {
        AccountingPeriod {
            id: 1,
            name: "2025-06".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            status: PeriodStatus::Open,
            pl_closed: false,
            inventory_closed: false,
            cash_closed: false,
            cash_closed_at: None,
            cash_closed_by: None,
        }
    }

    fn clock() -> FixedClock {
        FixedClock("2025-07-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
    }

    #[tokio::test]
    async fn clean_period_closes_and_writes_one_audit_row() {
        let store = MemoryLedger::new().with_period(june());
        let mut uow = store.begin().await.unwrap();

        let decision = close_cash_period(&mut uow, 1, "finance@acme", &clock())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let CloseDecision::Closed(outcome) = decision else {
            panic!("expected a successful close");
        };
        assert_eq!(outcome.snapshot_hash.len(), 64);
        assert_eq!(store.close_audit_count(), 1);

        let period = store.period(1).unwrap();
        assert!(period.cash_closed);
        assert_eq!(period.cash_closed_by.as_deref(), Some("finance@acme"));
    }

    #[tokio::test]
    async fn close_is_not_reentrant() {
        let store = MemoryLedger::new().with_period(june());

        let mut uow = store.begin().await.unwrap();
        close_cash_period(&mut uow, 1, "finance@acme", &clock())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let decision = close_cash_period(&mut uow, 1, "finance@acme", &clock())
            .await
            .unwrap();

        let CloseDecision::Blocked(validation) = decision else {
            panic!("expected a blocked close");
        };
        assert!(!validation.checks.not_already_closed.pass);
        assert_eq!(store.close_audit_count(), 1);
    }

    #[tokio::test]
    async fn missing_bank_reconciliation_blocks_until_completed() {
        let store = MemoryLedger::new().with_period(june());
        store.enable_bank_reconciliations();

        let mut uow = store.begin().await.unwrap();
        let validation = validate_cash_close(&mut uow, 1).await.unwrap();
        assert!(!validation.can_close);
        assert!(!validation.checks.bank_reconciled.pass);
        drop(uow);

        store.add_bank_reconciliation(1, "COMPLETED", None);
        let mut uow = store.begin().await.unwrap();
        let validation = validate_cash_close(&mut uow, 1).await.unwrap();
        assert!(validation.checks.bank_reconciled.pass);
        assert!(validation.can_close);
    }

    #[tokio::test]
    async fn explanation_counts_as_reconciled() {
        let store = MemoryLedger::new().with_period(june());
        store.add_bank_reconciliation(1, "PENDING", Some("timing difference, see memo"));

        let mut uow = store.begin().await.unwrap();
        let validation = validate_cash_close(&mut uow, 1).await.unwrap();
        assert!(validation.checks.bank_reconciled.pass);
    }

    #[tokio::test]
    async fn identical_ledgers_produce_identical_snapshot_hashes() {
        let hash_of = |store: MemoryLedger| async move {
            let mut uow = store.begin().await.unwrap();
            let decision = close_cash_period(&mut uow, 1, "finance@acme", &clock())
                .await
                .unwrap();
            match decision {
                CloseDecision::Closed(outcome) => outcome.snapshot_hash,
                CloseDecision::Blocked(_) => panic!("expected close"),
            }
        };

        let first = hash_of(MemoryLedger::new().with_period(june())).await;
        let second = hash_of(MemoryLedger::new().with_period(june())).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_period_is_an_error() {
        let store = MemoryLedger::new();
        let mut uow = store.begin().await.unwrap();
        assert!(matches!(
            close_cash_period(&mut uow, 9, "x", &clock()).await,
            Err(CloseError::PeriodNotFound(9))
        ));
    }
}

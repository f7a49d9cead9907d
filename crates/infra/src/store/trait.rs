//! The `LedgerStore` / `LedgerUow` traits.
//!
//! A unit of work is one open transaction against the external relational
//! store: every read and write for one event (or one close attempt) goes
//! through one uow, `commit()` makes it durable, dropping it rolls back.
//! The core never migrates schema; it assumes the documented tables exist.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use anchorledger_accounting::{
    Account, AccountBalanceRow, AccountSpec, AccountType, AccountingPeriod, DateRange,
    NewJournalEntry,
};
use anchorledger_events::{EventLogEntry, EventOutcome, EventType};
use anchorledger_inventory::{Product, StockMovement};
use anchorledger_sales::{NewSalesOrder, OrderLinePrice};

/// Store operation error. Infrastructure failures, as opposed to the
/// domain rejections in `anchorledger_core::LedgerError`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row stamped with this `source_event_id` already exists in the
    /// target table (uniqueness is enforced by the backend, so two racing
    /// deliveries of one event cannot both insert).
    #[error("rows for source event {0} already exist")]
    DuplicateSource(Uuid),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Aggregated balance query over posted journal lines.
///
/// `from = None` accumulates from the dawn of the ledger ("as of" query);
/// otherwise lines are bounded to `from..=to` by entry date. Accounts with
/// no matching lines are still returned with zero sums.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceQuery {
    /// Empty means all account types.
    pub account_types: Vec<AccountType>,
    pub from: Option<NaiveDate>,
    pub to: NaiveDate,
}

impl BalanceQuery {
    pub fn range(account_types: &[AccountType], range: DateRange) -> Self {
        Self {
            account_types: account_types.to_vec(),
            from: Some(range.start),
            to: range.end,
        }
    }

    pub fn as_of(account_types: &[AccountType], to: NaiveDate) -> Self {
        Self {
            account_types: account_types.to_vec(),
            from: None,
            to,
        }
    }

    pub fn matches_type(&self, account_type: AccountType) -> bool {
        self.account_types.is_empty() || self.account_types.contains(&account_type)
    }
}

/// Semantic account matchers used by reporting and close checks.
///
/// A closed set interpreted by each backend (subtype/name matching in
/// memory, LIKE predicates in SQL) instead of stringly-typed SQL fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSelector {
    /// Cash or bank accounts (subtype contains "cash" or "bank").
    CashOrBank,
    /// Transient clearing accounts expected to net to zero.
    Clearing,
    /// Receivable-subtype accounts.
    Receivable,
    /// Payable-subtype accounts.
    Payable,
    /// Inventory-subtype assets.
    InventorySubtype,
    /// Depreciation expense (subtype or account name).
    Depreciation,
    /// Amortization expense (subtype or account name).
    Amortization,
}

impl AccountSelector {
    pub fn matches(self, account: &Account) -> bool {
        match self {
            Self::CashOrBank => {
                account.subtype_contains("cash") || account.subtype_contains("bank")
            }
            Self::Clearing => account.subtype_contains("clearing"),
            Self::Receivable => account.subtype_contains("receivable"),
            Self::Payable => account.subtype_contains("payable"),
            Self::InventorySubtype => account.subtype_contains("inventory"),
            Self::Depreciation => {
                account.subtype_contains("depreciation") || account.name_contains("depreciation")
            }
            Self::Amortization => {
                account.subtype_contains("amortization") || account.name_contains("amortization")
            }
        }
    }
}

/// Per-entry cash profile used by the internal-transfer close check:
/// the net debit−credit over the entry's cash/bank lines, and how many of
/// its lines are *not* cash/bank.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalCashProfile {
    pub entry_id: i64,
    pub entry_number: String,
    pub cash_delta: f64,
    pub non_cash_lines: u32,
}

/// Latest bank reconciliation state for a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankReconciliationStatus {
    /// The reconciliation table does not exist at all; the close check is
    /// vacuously true.
    TableMissing,
    NotFound,
    Found {
        status: String,
        explanation: Option<String>,
    },
}

/// A memoized receiver response for one idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status_code: u16,
    pub outcome: EventOutcome,
    pub body: Value,
}

/// Insert form of one close-audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCloseAudit {
    pub period_id: i64,
    pub closed_by: String,
    pub snapshot: Value,
    pub snapshot_hash: String,
    pub validation: Value,
}

/// Factory for units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Uow: LedgerUow;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Uow, StoreError>;
}

/// One open transaction against the ledger schema.
///
/// Dropping a uow without committing rolls everything back; a failure in
/// any step therefore leaves ledger state exactly as it was.
#[async_trait]
pub trait LedgerUow: Send {
    async fn commit(self) -> Result<(), StoreError>;

    // -- accounting periods ------------------------------------------------

    async fn period_for_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, StoreError>;

    async fn period_by_id(&mut self, id: i64) -> Result<Option<AccountingPeriod>, StoreError>;

    /// Lock the period row for the remainder of this transaction,
    /// serializing concurrent close attempts.
    async fn lock_period(&mut self, id: i64) -> Result<AccountingPeriod, StoreError>;

    /// Periods with `pl_closed = true` ending strictly before `date`,
    /// ordered by end date.
    async fn closed_pl_periods_before(
        &mut self,
        date: NaiveDate,
    ) -> Result<Vec<AccountingPeriod>, StoreError>;

    async fn mark_cash_closed(
        &mut self,
        id: i64,
        closed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // -- chart of accounts -------------------------------------------------

    /// Find the account with the spec's code, creating it on first use.
    async fn ensure_account(&mut self, spec: &AccountSpec) -> Result<i64, StoreError>;

    // -- products and orders -----------------------------------------------

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError>;

    async fn insert_sales_order(&mut self, order: &NewSalesOrder) -> Result<Uuid, StoreError>;

    /// Agreed unit price per SKU from the originating order's lines.
    /// Empty map means the order does not exist.
    async fn order_line_prices(
        &mut self,
        order_number: &str,
    ) -> Result<HashMap<String, OrderLinePrice>, StoreError>;

    // -- journals and stock movements --------------------------------------

    /// Insert a journal entry and its lines atomically, returning the
    /// entry id.
    async fn insert_journal(&mut self, entry: &NewJournalEntry) -> Result<i64, StoreError>;

    async fn insert_stock_movement(
        &mut self,
        movement: &StockMovement,
    ) -> Result<(), StoreError>;

    /// Whether any journal entry, stock movement, or sales order already
    /// carries this `source_event_id`.
    async fn source_event_applied(&mut self, event_id: Uuid) -> Result<bool, StoreError>;

    // -- event audit log ---------------------------------------------------

    async fn has_accepted_event(
        &mut self,
        order_id: &str,
        event_type: EventType,
    ) -> Result<bool, StoreError>;

    async fn append_event_log(&mut self, entry: &EventLogEntry) -> Result<(), StoreError>;

    async fn record_response(
        &mut self,
        idempotency_key: &str,
        response: &StoredResponse,
    ) -> Result<(), StoreError>;

    async fn response_for_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<StoredResponse>, StoreError>;

    // -- reporting reads ---------------------------------------------------

    /// Summed posted debits/credits per account (posted entries only).
    async fn account_balances(
        &mut self,
        query: &BalanceQuery,
    ) -> Result<Vec<AccountBalanceRow>, StoreError>;

    /// Count of non-posted journal lines in range touching accounts that
    /// match the selector.
    async fn draft_line_count(
        &mut self,
        range: &DateRange,
        selector: AccountSelector,
    ) -> Result<u64, StoreError>;

    /// Cash profile of every journal entry dated in range.
    async fn journal_cash_profiles(
        &mut self,
        range: &DateRange,
    ) -> Result<Vec<JournalCashProfile>, StoreError>;

    // -- period close ------------------------------------------------------

    async fn latest_bank_reconciliation(
        &mut self,
        period_id: i64,
    ) -> Result<BankReconciliationStatus, StoreError>;

    async fn insert_close_audit(&mut self, audit: &NewCloseAudit) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorledger_accounting::NormalBalance;

    fn account(subtype: Option<&str>, name: &str) -> Account {
        Account {
            id: 1,
            code: "1110".into(),
            name: name.into(),
            account_type: AccountType::Asset,
            subtype: subtype.map(str::to_string),
            normal_balance: Some(NormalBalance::Debit),
        }
    }

    #[test]
    fn selectors_match_on_subtype() {
        assert!(AccountSelector::CashOrBank.matches(&account(Some("Cash"), "Cash")));
        assert!(AccountSelector::CashOrBank.matches(&account(Some("Bank - Operating"), "BCA")));
        assert!(!AccountSelector::CashOrBank.matches(&account(Some("Inventory"), "Stock")));
        assert!(AccountSelector::Receivable
            .matches(&account(Some("Accounts Receivable"), "AR")));
        assert!(AccountSelector::Clearing.matches(&account(Some("Clearing"), "Transfers")));
    }

    #[test]
    fn depreciation_matches_subtype_or_name() {
        assert!(AccountSelector::Depreciation
            .matches(&account(Some("Depreciation"), "Equipment")));
        assert!(AccountSelector::Depreciation
            .matches(&account(None, "Depreciation Expense")));
        assert!(!AccountSelector::Depreciation.matches(&account(None, "Rent")));
    }

    #[test]
    fn empty_type_filter_matches_everything() {
        let query = BalanceQuery::as_of(&[], NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert!(query.matches_type(AccountType::Asset));
        assert!(query.matches_type(AccountType::SalesReturn));

        let assets_only = BalanceQuery::as_of(
            &[AccountType::Asset],
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        );
        assert!(assets_only.matches_type(AccountType::Asset));
        assert!(!assets_only.matches_type(AccountType::Revenue));
    }
}

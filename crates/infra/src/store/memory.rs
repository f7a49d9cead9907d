//! In-memory ledger store.
//!
//! Backs unit and integration tests. A uow clones the whole state up
//! front and `commit()` swaps it back in; dropping the uow discards the
//! clone, which gives the same all-or-nothing behavior as a database
//! transaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use anchorledger_accounting::{
    Account, AccountBalanceRow, AccountSpec, AccountingPeriod, DateRange, JournalEntry,
    NewJournalEntry, NormalBalance,
};
use anchorledger_events::{EventLogEntry, EventOutcome, EventType};
use anchorledger_inventory::{Product, StockMovement};
use anchorledger_sales::{NewSalesOrder, OrderLinePrice, OrderStatus, SalesOrder, SalesOrderItem};

use super::r#trait::{
    AccountSelector, BalanceQuery, BankReconciliationStatus, JournalCashProfile, LedgerStore,
    LedgerUow, NewCloseAudit, StoreError, StoredResponse,
};

#[derive(Debug, Clone, PartialEq)]
struct BankReconciliationRow {
    period_id: i64,
    status: String,
    explanation: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    periods: Vec<AccountingPeriod>,
    accounts: Vec<Account>,
    next_account_id: i64,
    products: Vec<Product>,
    orders: Vec<SalesOrder>,
    order_items: Vec<SalesOrderItem>,
    journals: Vec<JournalEntry>,
    next_journal_id: i64,
    movements: Vec<StockMovement>,
    event_log: Vec<EventLogEntry>,
    responses: HashMap<String, StoredResponse>,
    /// Mirrors whether the reconciliation table exists in the schema.
    bank_reconciliation_table: bool,
    bank_reconciliations: Vec<BankReconciliationRow>,
    close_audits: Vec<NewCloseAudit>,
}

impl LedgerState {
    fn account_by_id(&self, id: i64) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }
}

/// In-memory store with seeding helpers for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(self, period: AccountingPeriod) -> Self {
        self.state.lock().unwrap().periods.push(period);
        self
    }

    pub fn with_product(self, product: Product) -> Self {
        self.state.lock().unwrap().products.push(product);
        self
    }

    pub fn add_period(&self, period: AccountingPeriod) {
        self.state.lock().unwrap().periods.push(period);
    }

    pub fn add_product(&self, product: Product) {
        self.state.lock().unwrap().products.push(product);
    }

    pub fn add_account(&self, account: Account) {
        let mut state = self.state.lock().unwrap();
        state.next_account_id = state.next_account_id.max(account.id);
        state.accounts.push(account);
    }

    /// Make the bank reconciliation table "exist" (it is optional schema).
    pub fn enable_bank_reconciliations(&self) {
        self.state.lock().unwrap().bank_reconciliation_table = true;
    }

    pub fn add_bank_reconciliation(
        &self,
        period_id: i64,
        status: &str,
        explanation: Option<&str>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.bank_reconciliation_table = true;
        state.bank_reconciliations.push(BankReconciliationRow {
            period_id,
            status: status.to_string(),
            explanation: explanation.map(str::to_string),
        });
    }

    // Read accessors for assertions.

    pub fn journals(&self) -> Vec<JournalEntry> {
        self.state.lock().unwrap().journals.clone()
    }

    pub fn movements(&self) -> Vec<StockMovement> {
        self.state.lock().unwrap().movements.clone()
    }

    pub fn orders(&self) -> Vec<SalesOrder> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn event_log(&self) -> Vec<EventLogEntry> {
        self.state.lock().unwrap().event_log.clone()
    }

    pub fn close_audit_count(&self) -> usize {
        self.state.lock().unwrap().close_audits.len()
    }

    pub fn latest_close_snapshot_hash(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .close_audits
            .last()
            .map(|audit| audit.snapshot_hash.clone())
    }

    pub fn period(&self, id: i64) -> Option<AccountingPeriod> {
        self.state
            .lock()
            .unwrap()
            .periods
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    type Uow = MemoryUow;

    async fn begin(&self) -> Result<MemoryUow, StoreError> {
        let work = self.state.lock().unwrap().clone();
        Ok(MemoryUow {
            shared: Arc::clone(&self.state),
            work,
        })
    }
}

/// One snapshot-and-swap "transaction" over [`MemoryLedger`].
#[derive(Debug)]
pub struct MemoryUow {
    shared: Arc<Mutex<LedgerState>>,
    work: LedgerState,
}

#[async_trait]
impl LedgerUow for MemoryUow {
    async fn commit(self) -> Result<(), StoreError> {
        *self.shared.lock().unwrap() = self.work;
        Ok(())
    }

    async fn period_for_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, StoreError> {
        Ok(self
            .work
            .periods
            .iter()
            .find(|p| p.contains(date))
            .cloned())
    }

    async fn period_by_id(&mut self, id: i64) -> Result<Option<AccountingPeriod>, StoreError> {
        Ok(self.work.periods.iter().find(|p| p.id == id).cloned())
    }

    async fn lock_period(&mut self, id: i64) -> Result<AccountingPeriod, StoreError> {
        self.work
            .periods
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("accounting period {id}")))
    }

    async fn closed_pl_periods_before(
        &mut self,
        date: NaiveDate,
    ) -> Result<Vec<AccountingPeriod>, StoreError> {
        let mut periods: Vec<_> = self
            .work
            .periods
            .iter()
            .filter(|p| p.pl_closed && p.end_date < date)
            .cloned()
            .collect();
        periods.sort_by_key(|p| p.end_date);
        Ok(periods)
    }

    async fn mark_cash_closed(
        &mut self,
        id: i64,
        closed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let period = self
            .work
            .periods
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("accounting period {id}")))?;
        period.cash_closed = true;
        period.cash_closed_at = Some(at);
        period.cash_closed_by = Some(closed_by.to_string());
        Ok(())
    }

    async fn ensure_account(&mut self, spec: &AccountSpec) -> Result<i64, StoreError> {
        if let Some(account) = self.work.accounts.iter().find(|a| a.code == spec.code) {
            return Ok(account.id);
        }

        self.work.next_account_id += 1;
        let id = self.work.next_account_id;
        self.work.accounts.push(Account {
            id,
            code: spec.code.to_string(),
            name: spec.name.to_string(),
            account_type: spec.account_type,
            subtype: Some(spec.subtype.to_string()),
            normal_balance: Some(NormalBalance::default_for(spec.account_type)),
        });
        Ok(id)
    }

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.work.products.iter().find(|p| p.sku == sku).cloned())
    }

    async fn insert_sales_order(&mut self, order: &NewSalesOrder) -> Result<Uuid, StoreError> {
        if self
            .work
            .orders
            .iter()
            .any(|o| o.source_event_id == order.source_event_id)
        {
            return Err(StoreError::DuplicateSource(order.source_event_id));
        }

        let subtotal = order.subtotal();
        let order_id = Uuid::now_v7();
        self.work.orders.push(SalesOrder {
            id: order_id,
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            status: OrderStatus::Confirmed,
            order_date: order.order_date,
            subtotal,
            total_amount: subtotal,
            source_event_id: order.source_event_id,
        });
        for item in &order.items {
            self.work.order_items.push(SalesOrderItem {
                id: Uuid::now_v7(),
                sales_order_id: order_id,
                product_id: item.product_id,
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total(),
                source_event_id: order.source_event_id,
            });
        }
        Ok(order_id)
    }

    async fn order_line_prices(
        &mut self,
        order_number: &str,
    ) -> Result<HashMap<String, OrderLinePrice>, StoreError> {
        let Some(order) = self
            .work
            .orders
            .iter()
            .find(|o| o.order_number == order_number)
        else {
            return Ok(HashMap::new());
        };

        Ok(self
            .work
            .order_items
            .iter()
            .filter(|item| item.sales_order_id == order.id)
            .map(|item| {
                (
                    item.sku.clone(),
                    OrderLinePrice {
                        product_id: item.product_id,
                        unit_price: item.unit_price,
                    },
                )
            })
            .collect())
    }

    async fn insert_journal(&mut self, entry: &NewJournalEntry) -> Result<i64, StoreError> {
        if self
            .work
            .journals
            .iter()
            .any(|j| j.source_event_id == entry.source_event_id)
        {
            return Err(StoreError::DuplicateSource(entry.source_event_id));
        }

        self.work.next_journal_id += 1;
        let id = self.work.next_journal_id;
        self.work.journals.push(JournalEntry {
            id,
            entry_number: entry.entry_number.clone(),
            entry_date: entry.entry_date,
            entry_type: entry.entry_type.clone(),
            reference: entry.reference.clone(),
            description: entry.description.clone(),
            status: entry.status,
            total_debit: entry.total_debit,
            total_credit: entry.total_credit,
            source_event_id: entry.source_event_id,
            posted_at: entry.posted_at,
            lines: entry.lines.clone(),
        });
        Ok(id)
    }

    async fn insert_stock_movement(
        &mut self,
        movement: &StockMovement,
    ) -> Result<(), StoreError> {
        self.work.movements.push(movement.clone());
        Ok(())
    }

    async fn source_event_applied(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .work
            .journals
            .iter()
            .any(|j| j.source_event_id == event_id)
            || self
                .work
                .orders
                .iter()
                .any(|o| o.source_event_id == event_id)
            || self
                .work
                .movements
                .iter()
                .any(|m| m.source_event_id == event_id))
    }

    async fn has_accepted_event(
        &mut self,
        order_id: &str,
        event_type: EventType,
    ) -> Result<bool, StoreError> {
        Ok(self.work.event_log.iter().any(|entry| {
            entry.outcome == EventOutcome::Accepted
                && entry.event_type == event_type
                && entry.order_id.as_deref() == Some(order_id)
        }))
    }

    async fn append_event_log(&mut self, entry: &EventLogEntry) -> Result<(), StoreError> {
        self.work.event_log.push(entry.clone());
        Ok(())
    }

    async fn record_response(
        &mut self,
        idempotency_key: &str,
        response: &StoredResponse,
    ) -> Result<(), StoreError> {
        self.work
            .responses
            .insert(idempotency_key.to_string(), response.clone());
        Ok(())
    }

    async fn response_for_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<StoredResponse>, StoreError> {
        Ok(self.work.responses.get(idempotency_key).cloned())
    }

    async fn account_balances(
        &mut self,
        query: &BalanceQuery,
    ) -> Result<Vec<AccountBalanceRow>, StoreError> {
        let in_window = |date: NaiveDate| {
            date <= query.to && query.from.is_none_or(|from| from <= date)
        };

        let mut rows = Vec::new();
        for account in &self.work.accounts {
            if !query.matches_type(account.account_type) {
                continue;
            }

            let mut debit = 0.0;
            let mut credit = 0.0;
            for journal in &self.work.journals {
                if !journal.status.is_posted() || !in_window(journal.entry_date) {
                    continue;
                }
                for line in &journal.lines {
                    if line.account_id == account.id {
                        debit += line.debit;
                        credit += line.credit;
                    }
                }
            }

            rows.push(AccountBalanceRow {
                account: account.clone(),
                debit,
                credit,
            });
        }
        Ok(rows)
    }

    async fn draft_line_count(
        &mut self,
        range: &DateRange,
        selector: AccountSelector,
    ) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for journal in &self.work.journals {
            if journal.status.is_posted() || !range.contains(journal.entry_date) {
                continue;
            }
            for line in &journal.lines {
                if self
                    .work
                    .account_by_id(line.account_id)
                    .is_some_and(|account| selector.matches(account))
                {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn journal_cash_profiles(
        &mut self,
        range: &DateRange,
    ) -> Result<Vec<JournalCashProfile>, StoreError> {
        let mut profiles = Vec::new();
        for journal in &self.work.journals {
            if !range.contains(journal.entry_date) {
                continue;
            }

            let mut cash_delta = 0.0;
            let mut non_cash_lines = 0u32;
            for line in &journal.lines {
                let is_cash = self
                    .work
                    .account_by_id(line.account_id)
                    .is_some_and(|account| AccountSelector::CashOrBank.matches(account));
                if is_cash {
                    cash_delta += line.debit - line.credit;
                } else {
                    non_cash_lines += 1;
                }
            }

            profiles.push(JournalCashProfile {
                entry_id: journal.id,
                entry_number: journal.entry_number.clone(),
                cash_delta,
                non_cash_lines,
            });
        }
        Ok(profiles)
    }

    async fn latest_bank_reconciliation(
        &mut self,
        period_id: i64,
    ) -> Result<BankReconciliationStatus, StoreError> {
        if !self.work.bank_reconciliation_table {
            return Ok(BankReconciliationStatus::TableMissing);
        }

        Ok(self
            .work
            .bank_reconciliations
            .iter()
            .rev()
            .find(|row| row.period_id == period_id)
            .map_or(BankReconciliationStatus::NotFound, |row| {
                BankReconciliationStatus::Found {
                    status: row.status.clone(),
                    explanation: row.explanation.clone(),
                }
            }))
    }

    async fn insert_close_audit(&mut self, audit: &NewCloseAudit) -> Result<(), StoreError> {
        self.work.close_audits.push(audit.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorledger_accounting::{
        AccountRole, JournalLine, JournalStatus, PeriodStatus,
    };

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

    fn journal(source_event_id: Uuid, account_id: i64, amount: f64) -> NewJournalEntry {
        NewJournalEntry {
            entry_number: "JE-TEST-00001".into(),
            entry_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            entry_type: "Receipt".into(),
            reference: None,
            description: "test".into(),
            status: JournalStatus::Posted,
            total_debit: amount,
            total_credit: amount,
            source_event_id,
            posted_at: Some(Utc::now()),
            lines: vec![
                JournalLine {
                    line_number: 1,
                    account_id,
                    description: "debit".into(),
                    debit: amount,
                    credit: 0.0,
                    source_event_id,
                },
                JournalLine {
                    line_number: 2,
                    account_id: account_id + 1,
                    description: "credit".into(),
                    debit: 0.0,
                    credit: amount,
                    source_event_id,
                },
            ],
        }
    }

    #[tokio::test]
    async fn ensure_account_is_idempotent() {
        let store = MemoryLedger::new();
        let mut uow = store.begin().await.unwrap();
        let spec = AccountRole::Cash.spec();

        let first = uow.ensure_account(&spec).await.unwrap();
        let second = uow.ensure_account(&spec).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded() {
        let store = MemoryLedger::new().with_period(june());

        {
            let mut uow = store.begin().await.unwrap();
            let cash = uow.ensure_account(&AccountRole::Cash.spec()).await.unwrap();
            uow.insert_journal(&journal(Uuid::now_v7(), cash, 10.0))
                .await
                .unwrap();
            // dropped without commit
        }

        assert!(store.journals().is_empty());
    }

    #[tokio::test]
    async fn duplicate_journal_source_is_rejected() {
        let store = MemoryLedger::new();
        let mut uow = store.begin().await.unwrap();
        let cash = uow.ensure_account(&AccountRole::Cash.spec()).await.unwrap();

        let event_id = Uuid::now_v7();
        uow.insert_journal(&journal(event_id, cash, 10.0))
            .await
            .unwrap();
        let err = uow
            .insert_journal(&journal(event_id, cash, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSource(id) if id == event_id));
        assert!(uow.source_event_applied(event_id).await.unwrap());
    }

    #[tokio::test]
    async fn balances_include_zero_accounts_and_respect_the_window() {
        let store = MemoryLedger::new();
        let mut uow = store.begin().await.unwrap();
        let cash = uow.ensure_account(&AccountRole::Cash.spec()).await.unwrap();
        uow.ensure_account(&AccountRole::Inventory.spec())
            .await
            .unwrap();
        let idle = uow
            .ensure_account(&AccountRole::Revenue.spec())
            .await
            .unwrap();
        uow.insert_journal(&journal(Uuid::now_v7(), cash, 25.0))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let rows = uow
            .account_balances(&BalanceQuery::as_of(
                &[],
                NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            ))
            .await
            .unwrap();
        // Every account comes back, including ones with no activity.
        assert_eq!(rows.len(), 3);
        let cash_row = rows.iter().find(|r| r.account.id == cash).unwrap();
        assert_eq!(cash_row.debit, 25.0);
        let idle_row = rows.iter().find(|r| r.account.id == idle).unwrap();
        assert_eq!((idle_row.debit, idle_row.credit), (0.0, 0.0));

        // A window before the posting sums to zero.
        let rows = uow
            .account_balances(&BalanceQuery::as_of(
                &[],
                NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
            ))
            .await
            .unwrap();
        assert!(rows.iter().all(|r| r.debit == 0.0 && r.credit == 0.0));
    }

    #[tokio::test]
    async fn bank_reconciliation_table_is_optional() {
        let store = MemoryLedger::new();
        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.latest_bank_reconciliation(1).await.unwrap(),
            BankReconciliationStatus::TableMissing
        );
        drop(uow);

        store.add_bank_reconciliation(1, "COMPLETED", None);
        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.latest_bank_reconciliation(2).await.unwrap(),
            BankReconciliationStatus::NotFound
        );
        assert!(matches!(
            uow.latest_bank_reconciliation(1).await.unwrap(),
            BankReconciliationStatus::Found { status, .. } if status == "COMPLETED"
        ));
    }
}

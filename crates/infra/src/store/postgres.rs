//! Postgres-backed ledger store.
//!
//! One [`PgUow`] wraps one sqlx transaction; nothing is visible to other
//! connections until `commit()`. The schema is assumed to exist (the core
//! never migrates): `accounting_periods`, `chart_of_accounts`,
//! `journal_entries`, `journal_entry_lines`, `stock_movements`,
//! `sales_orders`, `sales_order_items`, `products`,
//! `bank_reconciliations` (optional), `cash_bank_close_audit`,
//! `anchor_event_log`, and `anchor_event_responses`. Unique indexes on
//! `journal_entries.source_event_id` and `sales_orders.source_event_id`
//! back the idempotency stamp; a `23505` on insert surfaces as
//! [`StoreError::DuplicateSource`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use anchorledger_accounting::{
    Account, AccountBalanceRow, AccountSpec, AccountType, AccountingPeriod, DateRange,
    NewJournalEntry, NormalBalance, PeriodStatus,
};
use anchorledger_events::{EventLogEntry, EventOutcome, EventType};
use anchorledger_inventory::{Product, StockMovement};
use anchorledger_sales::{NewSalesOrder, OrderLinePrice};

use super::r#trait::{
    AccountSelector, BalanceQuery, BankReconciliationStatus, JournalCashProfile, LedgerStore,
    LedgerUow, NewCloseAudit, StoreError, StoredResponse,
};

/// Postgres ledger store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: Arc<PgPool>,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    type Uow = PgUow;

    async fn begin(&self) -> Result<PgUow, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgUow { tx })
    }
}

/// One open Postgres transaction.
pub struct PgUow {
    tx: Transaction<'static, Postgres>,
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{operation}: {err}"))
}

/// Map an insert error, turning a unique violation on the source-event
/// stamp into `DuplicateSource`.
fn map_insert_error(operation: &str, source_event_id: Uuid, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateSource(source_event_id);
        }
    }
    map_sqlx_error(operation, err)
}

/// Account-matching predicate over the `coa` alias, mirroring
/// [`AccountSelector::matches`].
fn selector_sql(selector: AccountSelector) -> &'static str {
    match selector {
        AccountSelector::CashOrBank => {
            "(lower(coa.account_subtype) LIKE '%cash%' OR lower(coa.account_subtype) LIKE '%bank%')"
        }
        AccountSelector::Clearing => "lower(coa.account_subtype) LIKE '%clearing%'",
        AccountSelector::Receivable => "lower(coa.account_subtype) LIKE '%receivable%'",
        AccountSelector::Payable => "lower(coa.account_subtype) LIKE '%payable%'",
        AccountSelector::InventorySubtype => "lower(coa.account_subtype) LIKE '%inventory%'",
        AccountSelector::Depreciation => {
            "(lower(coa.account_subtype) LIKE '%depreciation%' OR lower(coa.account_name) LIKE '%depreciation%')"
        }
        AccountSelector::Amortization => {
            "(lower(coa.account_subtype) LIKE '%amortization%' OR lower(coa.account_name) LIKE '%amortization%')"
        }
    }
}

fn period_from_row(row: &PgRow) -> Result<AccountingPeriod, StoreError> {
    let status: String = row
        .try_get("status")
        .map_err(|e| map_sqlx_error("decode period", e))?;
    Ok(AccountingPeriod {
        id: row.try_get("id").map_err(|e| map_sqlx_error("decode period", e))?,
        name: row
            .try_get("period_name")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        start_date: row
            .try_get("start_date")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        end_date: row
            .try_get("end_date")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        status: PeriodStatus::parse(&status),
        pl_closed: row
            .try_get("pl_closed")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        inventory_closed: row
            .try_get("inventory_closed")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        cash_closed: row
            .try_get("cash_closed")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        cash_closed_at: row
            .try_get("cash_closed_at")
            .map_err(|e| map_sqlx_error("decode period", e))?,
        cash_closed_by: row
            .try_get("cash_closed_by")
            .map_err(|e| map_sqlx_error("decode period", e))?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let type_str: String = row
        .try_get("account_type")
        .map_err(|e| map_sqlx_error("decode account", e))?;
    let account_type = AccountType::parse(&type_str).ok_or_else(|| {
        StoreError::Backend(format!("unknown account_type in chart_of_accounts: {type_str}"))
    })?;
    let normal: Option<String> = row
        .try_get("normal_balance")
        .map_err(|e| map_sqlx_error("decode account", e))?;
    Ok(Account {
        id: row.try_get("id").map_err(|e| map_sqlx_error("decode account", e))?,
        code: row
            .try_get("account_code")
            .map_err(|e| map_sqlx_error("decode account", e))?,
        name: row
            .try_get("account_name")
            .map_err(|e| map_sqlx_error("decode account", e))?,
        account_type,
        subtype: row
            .try_get("account_subtype")
            .map_err(|e| map_sqlx_error("decode account", e))?,
        normal_balance: normal.as_deref().and_then(NormalBalance::parse),
    })
}

const PERIOD_COLUMNS: &str = "id, period_name, start_date, end_date, status, \
     pl_closed, inventory_closed, cash_closed, cash_closed_at, cash_closed_by";

#[async_trait]
impl LedgerUow for PgUow {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn period_for_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM accounting_periods \
             WHERE start_date <= $1 AND end_date >= $1 LIMIT 1"
        ))
        .bind(date)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("period_for_date", e))?;
        row.as_ref().map(period_from_row).transpose()
    }

    async fn period_by_id(&mut self, id: i64) -> Result<Option<AccountingPeriod>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM accounting_periods WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("period_by_id", e))?;
        row.as_ref().map(period_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn lock_period(&mut self, id: i64) -> Result<AccountingPeriod, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM accounting_periods WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_period", e))?;
        row.as_ref()
            .map(period_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("accounting period {id}")))
    }

    async fn closed_pl_periods_before(
        &mut self,
        date: NaiveDate,
    ) -> Result<Vec<AccountingPeriod>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM accounting_periods \
             WHERE pl_closed = true AND end_date < $1 ORDER BY end_date"
        ))
        .bind(date)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("closed_pl_periods_before", e))?;
        rows.iter().map(period_from_row).collect()
    }

    async fn mark_cash_closed(
        &mut self,
        id: i64,
        closed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounting_periods \
             SET cash_closed = true, cash_closed_at = $2, cash_closed_by = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .bind(closed_by)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("mark_cash_closed", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("accounting period {id}")));
        }
        Ok(())
    }

    async fn ensure_account(&mut self, spec: &AccountSpec) -> Result<i64, StoreError> {
        let existing = sqlx::query("SELECT id FROM chart_of_accounts WHERE account_code = $1")
            .bind(spec.code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("ensure_account", e))?;
        if let Some(row) = existing {
            return row
                .try_get("id")
                .map_err(|e| map_sqlx_error("ensure_account", e));
        }

        let row = sqlx::query(
            "INSERT INTO chart_of_accounts \
             (account_code, account_name, account_type, account_subtype, normal_balance) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(spec.code)
        .bind(spec.name)
        .bind(spec.account_type.as_str())
        .bind(spec.subtype)
        .bind(NormalBalance::default_for(spec.account_type).as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_account", e))?;
        row.try_get("id")
            .map_err(|e| map_sqlx_error("ensure_account", e))
    }

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT id, sku, product_name, cost_price::float8 AS cost_price, \
                    unit_price::float8 AS unit_price \
             FROM products WHERE sku = $1 LIMIT 1",
        )
        .bind(sku)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("product_by_sku", e))?;

        row.map(|row| -> Result<Product, StoreError> {
            Ok(Product {
                id: row.try_get("id").map_err(|e| map_sqlx_error("decode product", e))?,
                sku: row
                    .try_get("sku")
                    .map_err(|e| map_sqlx_error("decode product", e))?,
                name: row
                    .try_get("product_name")
                    .map_err(|e| map_sqlx_error("decode product", e))?,
                cost_price: row
                    .try_get("cost_price")
                    .map_err(|e| map_sqlx_error("decode product", e))?,
                unit_price: row
                    .try_get("unit_price")
                    .map_err(|e| map_sqlx_error("decode product", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn insert_sales_order(&mut self, order: &NewSalesOrder) -> Result<Uuid, StoreError> {
        let order_id = Uuid::now_v7();
        let subtotal = order.subtotal();
        sqlx::query(
            "INSERT INTO sales_orders \
             (id, order_number, customer_id, status, order_date, subtotal, total_amount, source_event_id) \
             VALUES ($1, $2, $3, 'confirmed', $4, $5, $6, $7)",
        )
        .bind(order_id)
        .bind(&order.order_number)
        .bind(&order.customer_id)
        .bind(order.order_date)
        .bind(subtotal)
        .bind(subtotal)
        .bind(order.source_event_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_insert_error("insert_sales_order", order.source_event_id, e))?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO sales_order_items \
                 (id, sales_order_id, product_id, sku, quantity, unit_price, line_total, source_event_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::now_v7())
            .bind(order_id)
            .bind(item.product_id)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total())
            .bind(order.source_event_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_insert_error("insert_sales_order_item", order.source_event_id, e))?;
        }
        Ok(order_id)
    }

    async fn order_line_prices(
        &mut self,
        order_number: &str,
    ) -> Result<HashMap<String, OrderLinePrice>, StoreError> {
        let rows = sqlx::query(
            "SELECT soi.sku, soi.product_id, soi.unit_price::float8 AS unit_price \
             FROM sales_order_items soi \
             JOIN sales_orders so ON so.id = soi.sales_order_id \
             WHERE so.order_number = $1",
        )
        .bind(order_number)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("order_line_prices", e))?;

        let mut prices = HashMap::with_capacity(rows.len());
        for row in rows {
            let sku: String = row
                .try_get("sku")
                .map_err(|e| map_sqlx_error("decode order line", e))?;
            prices.insert(
                sku,
                OrderLinePrice {
                    product_id: row
                        .try_get("product_id")
                        .map_err(|e| map_sqlx_error("decode order line", e))?,
                    unit_price: row
                        .try_get("unit_price")
                        .map_err(|e| map_sqlx_error("decode order line", e))?,
                },
            );
        }
        Ok(prices)
    }

    #[instrument(skip(self, entry), fields(entry_number = %entry.entry_number))]
    async fn insert_journal(&mut self, entry: &NewJournalEntry) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO journal_entries \
             (entry_number, entry_date, entry_type, reference, description, status, \
              total_debit, total_credit, source_event_id, posted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
        )
        .bind(&entry.entry_number)
        .bind(entry.entry_date)
        .bind(&entry.entry_type)
        .bind(&entry.reference)
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(entry.total_debit)
        .bind(entry.total_credit)
        .bind(entry.source_event_id)
        .bind(entry.posted_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_insert_error("insert_journal", entry.source_event_id, e))?;
        let entry_id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("insert_journal", e))?;

        for line in &entry.lines {
            sqlx::query(
                "INSERT INTO journal_entry_lines \
                 (journal_entry_id, line_number, account_id, description, \
                  debit_amount, credit_amount, source_event_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(entry_id)
            .bind(line.line_number as i32)
            .bind(line.account_id)
            .bind(&line.description)
            .bind(line.debit)
            .bind(line.credit)
            .bind(line.source_event_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_insert_error("insert_journal_line", line.source_event_id, e))?;
        }
        Ok(entry_id)
    }

    async fn insert_stock_movement(
        &mut self,
        movement: &StockMovement,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO stock_movements \
             (id, product_id, warehouse_id, movement_type, quantity, unit_cost, \
              total_value, reference, notes, movement_date, source_event_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(movement.id)
        .bind(movement.product_id)
        .bind(movement.warehouse_id)
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.unit_cost)
        .bind(movement.total_value)
        .bind(&movement.reference)
        .bind(&movement.notes)
        .bind(movement.movement_date)
        .bind(movement.source_event_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_insert_error("insert_stock_movement", movement.source_event_id, e))?;
        Ok(())
    }

    async fn source_event_applied(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM journal_entries WHERE source_event_id = $1) \
                 OR EXISTS (SELECT 1 FROM sales_orders WHERE source_event_id = $1) \
                 OR EXISTS (SELECT 1 FROM stock_movements WHERE source_event_id = $1) \
                 AS applied",
        )
        .bind(event_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("source_event_applied", e))?;
        row.try_get("applied")
            .map_err(|e| map_sqlx_error("source_event_applied", e))
    }

    async fn has_accepted_event(
        &mut self,
        order_id: &str,
        event_type: EventType,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS ( \
               SELECT 1 FROM anchor_event_log \
               WHERE order_id = $1 AND event_type = $2 AND outcome = 'ACCEPTED' \
             ) AS accepted",
        )
        .bind(order_id)
        .bind(event_type.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("has_accepted_event", e))?;
        row.try_get("accepted")
            .map_err(|e| map_sqlx_error("has_accepted_event", e))
    }

    async fn append_event_log(&mut self, entry: &EventLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO anchor_event_log \
             (event_id, idempotency_key, event_type, event_time, order_id, \
              payload, outcome, reason_code, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.event_id)
        .bind(&entry.idempotency_key)
        .bind(entry.event_type.as_str())
        .bind(entry.event_time)
        .bind(&entry.order_id)
        .bind(&entry.payload)
        .bind(entry.outcome.as_str())
        .bind(entry.reason_code.map(|c| c.as_str()))
        .bind(&entry.message)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_event_log", e))?;
        Ok(())
    }

    async fn record_response(
        &mut self,
        idempotency_key: &str,
        response: &StoredResponse,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO anchor_event_responses (idempotency_key, status_code, outcome, body) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(idempotency_key)
        .bind(response.status_code as i32)
        .bind(response.outcome.as_str())
        .bind(&response.body)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("record_response", e))?;
        Ok(())
    }

    async fn response_for_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<StoredResponse>, StoreError> {
        let row = sqlx::query(
            "SELECT status_code, outcome, body FROM anchor_event_responses \
             WHERE idempotency_key = $1 LIMIT 1",
        )
        .bind(idempotency_key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("response_for_key", e))?;

        row.map(|row| -> Result<StoredResponse, StoreError> {
            let status_code: i32 = row
                .try_get("status_code")
                .map_err(|e| map_sqlx_error("decode response", e))?;
            let outcome: String = row
                .try_get("outcome")
                .map_err(|e| map_sqlx_error("decode response", e))?;
            Ok(StoredResponse {
                status_code: status_code as u16,
                outcome: if outcome == "ACCEPTED" {
                    EventOutcome::Accepted
                } else {
                    EventOutcome::Rejected
                },
                body: row
                    .try_get("body")
                    .map_err(|e| map_sqlx_error("decode response", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, query))]
    async fn account_balances(
        &mut self,
        query: &BalanceQuery,
    ) -> Result<Vec<AccountBalanceRow>, StoreError> {
        let types: Vec<String> = query
            .account_types
            .iter()
            .map(|t| t.as_str().to_uppercase())
            .collect();

        let rows = sqlx::query(
            "SELECT coa.id, coa.account_code, coa.account_name, coa.account_type, \
                    coa.account_subtype, coa.normal_balance, \
                    COALESCE(SUM(jel.debit_amount), 0)::float8 AS debit, \
                    COALESCE(SUM(jel.credit_amount), 0)::float8 AS credit \
             FROM chart_of_accounts coa \
             LEFT JOIN journal_entry_lines jel ON jel.account_id = coa.id \
             LEFT JOIN journal_entries je ON je.id = jel.journal_entry_id \
                  AND je.status ILIKE 'POSTED' \
             WHERE (cardinality($1::text[]) = 0 OR upper(coa.account_type) = ANY($1::text[])) \
               AND (je.id IS NULL \
                    OR (je.entry_date <= $3 AND ($2::date IS NULL OR je.entry_date >= $2))) \
             GROUP BY coa.id, coa.account_code, coa.account_name, coa.account_type, \
                      coa.account_subtype, coa.normal_balance \
             ORDER BY coa.account_code",
        )
        .bind(&types)
        .bind(query.from)
        .bind(query.to)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("account_balances", e))?;

        rows.iter()
            .map(|row| {
                Ok(AccountBalanceRow {
                    account: account_from_row(row)?,
                    debit: row
                        .try_get("debit")
                        .map_err(|e| map_sqlx_error("decode balance", e))?,
                    credit: row
                        .try_get("credit")
                        .map_err(|e| map_sqlx_error("decode balance", e))?,
                })
            })
            .collect()
    }

    async fn draft_line_count(
        &mut self,
        range: &DateRange,
        selector: AccountSelector,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) AS draft_count \
             FROM journal_entries je \
             JOIN journal_entry_lines jel ON je.id = jel.journal_entry_id \
             JOIN chart_of_accounts coa ON coa.id = jel.account_id \
             WHERE je.entry_date BETWEEN $1 AND $2 \
               AND je.status NOT ILIKE 'POSTED' \
               AND {}",
            selector_sql(selector)
        );
        let row = sqlx::query(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("draft_line_count", e))?;
        let count: i64 = row
            .try_get("draft_count")
            .map_err(|e| map_sqlx_error("draft_line_count", e))?;
        Ok(count as u64)
    }

    async fn journal_cash_profiles(
        &mut self,
        range: &DateRange,
    ) -> Result<Vec<JournalCashProfile>, StoreError> {
        let cash = selector_sql(AccountSelector::CashOrBank);
        let sql = format!(
            "SELECT je.id, je.entry_number, \
                    COALESCE(SUM(CASE WHEN {cash} \
                        THEN jel.debit_amount - jel.credit_amount ELSE 0 END), 0)::float8 AS cash_delta, \
                    COALESCE(SUM(CASE WHEN {cash} THEN 0 ELSE 1 END), 0)::int8 AS non_cash_lines \
             FROM journal_entries je \
             JOIN journal_entry_lines jel ON je.id = jel.journal_entry_id \
             JOIN chart_of_accounts coa ON coa.id = jel.account_id \
             WHERE je.entry_date BETWEEN $1 AND $2 \
             GROUP BY je.id, je.entry_number"
        );
        let rows = sqlx::query(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("journal_cash_profiles", e))?;

        rows.iter()
            .map(|row| {
                let non_cash_lines: i64 = row
                    .try_get("non_cash_lines")
                    .map_err(|e| map_sqlx_error("decode cash profile", e))?;
                Ok(JournalCashProfile {
                    entry_id: row
                        .try_get("id")
                        .map_err(|e| map_sqlx_error("decode cash profile", e))?,
                    entry_number: row
                        .try_get("entry_number")
                        .map_err(|e| map_sqlx_error("decode cash profile", e))?,
                    cash_delta: row
                        .try_get("cash_delta")
                        .map_err(|e| map_sqlx_error("decode cash profile", e))?,
                    non_cash_lines: non_cash_lines as u32,
                })
            })
            .collect()
    }

    async fn latest_bank_reconciliation(
        &mut self,
        period_id: i64,
    ) -> Result<BankReconciliationStatus, StoreError> {
        let exists_row = sqlx::query(
            "SELECT EXISTS ( \
               SELECT 1 FROM information_schema.tables \
               WHERE table_schema = 'public' AND table_name = 'bank_reconciliations' \
             ) AS table_exists",
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("latest_bank_reconciliation", e))?;
        let table_exists: bool = exists_row
            .try_get("table_exists")
            .map_err(|e| map_sqlx_error("latest_bank_reconciliation", e))?;
        if !table_exists {
            return Ok(BankReconciliationStatus::TableMissing);
        }

        let row = sqlx::query(
            "SELECT status, explanation FROM bank_reconciliations \
             WHERE period_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(period_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("latest_bank_reconciliation", e))?;

        Ok(match row {
            None => BankReconciliationStatus::NotFound,
            Some(row) => BankReconciliationStatus::Found {
                status: row
                    .try_get("status")
                    .map_err(|e| map_sqlx_error("decode reconciliation", e))?,
                explanation: row
                    .try_get("explanation")
                    .map_err(|e| map_sqlx_error("decode reconciliation", e))?,
            },
        })
    }

    #[instrument(skip(self, audit), fields(period_id = audit.period_id))]
    async fn insert_close_audit(&mut self, audit: &NewCloseAudit) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO cash_bank_close_audit \
             (period_id, closed_by, snapshot, snapshot_hash, validation) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(audit.period_id)
        .bind(&audit.closed_by)
        .bind(&audit.snapshot)
        .bind(&audit.snapshot_hash)
        .bind(&audit.validation)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_close_audit", e))?;
        Ok(())
    }
}

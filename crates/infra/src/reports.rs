//! Reporting engine: P&L, balance sheet, and indirect cash flow derived
//! from posted journal rows.
//!
//! Pure read side. Every number is recomputed from the journal on each
//! call; nothing here mutates ledger state. Monetary outputs are rounded
//! to two decimals at the output boundary only.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use anchorledger_accounting::{
    AccountBalanceRow, AccountType, AccountingPeriod, DateRange,
};
use anchorledger_core::{money_eq, round2};

use crate::store::{AccountSelector, BalanceQuery, LedgerUow, StoreError};

/// Temporary (P&L) account types cleared into retained earnings at close.
const TEMP_TYPES: [AccountType; 4] = [
    AccountType::Revenue,
    AccountType::Expense,
    AccountType::Cogs,
    AccountType::SalesReturn,
];

const BALANCE_SHEET_TYPES: [AccountType; 3] = [
    AccountType::Asset,
    AccountType::Liability,
    AccountType::Equity,
];

/// Accumulation floor for balance-sheet balances.
fn epoch_floor() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("accounting period {0} not found")]
    PeriodNotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to report over: a known period, or an explicit date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSpan {
    Period(i64),
    Dates { from: NaiveDate, to: NaiveDate },
}

/// The resolved range echoed back on every report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub account_id: Option<i64>,
    pub account_name: String,
    pub account_type: String,
    pub account_subtype: Option<String>,
    pub amount: f64,
}

impl ReportLine {
    fn from_row(row: &AccountBalanceRow, amount: f64) -> Self {
        Self {
            account_id: Some(row.account.id),
            account_name: row.account.name.clone(),
            account_type: row.account.account_type.as_str().to_string(),
            account_subtype: row.account.subtype.clone(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitAndLoss {
    pub range: ReportRange,
    pub revenue_total: f64,
    pub expense_total: f64,
    pub net_profit: f64,
    pub breakdown: Vec<ReportLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSheet {
    pub range: ReportRange,
    pub assets_total: f64,
    pub liabilities_total: f64,
    pub equity_total: f64,
    pub retained_earnings: f64,
    pub current_period_net_income: f64,
    pub balanced: bool,
    pub imbalance_delta: f64,
    pub assets: Vec<ReportLine>,
    pub liabilities: Vec<ReportLine>,
    pub equity: Vec<ReportLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlow {
    pub range: ReportRange,
    pub net_income: f64,
    pub non_cash_adjustments: f64,
    pub working_capital_delta: f64,
    pub indirect_net_cash: f64,
    pub opening_cash: f64,
    pub closing_cash: f64,
    pub net_cash_change: f64,
    pub reconciled: bool,
    pub reconciliation_delta: f64,
    pub operating_cash_flow: f64,
    pub investing_cash_flow: f64,
    pub financing_cash_flow: f64,
}

async fn resolve_span<U: LedgerUow>(
    uow: &mut U,
    span: ReportSpan,
) -> Result<ReportRange, ReportError> {
    match span {
        ReportSpan::Period(id) => {
            let period = period_by_id(uow, id).await?;
            Ok(ReportRange {
                start_date: period.start_date,
                end_date: period.end_date,
                period_name: Some(period.name),
            })
        }
        ReportSpan::Dates { from, to } => Ok(ReportRange {
            start_date: from,
            end_date: to,
            period_name: None,
        }),
    }
}

async fn period_by_id<U: LedgerUow>(
    uow: &mut U,
    id: i64,
) -> Result<AccountingPeriod, ReportError> {
    uow.period_by_id(id)
        .await?
        .ok_or(ReportError::PeriodNotFound(id))
}

/// Unclamped net income over a range: Revenue signed amounts minus the
/// signed amounts of every other temporary account.
pub async fn net_income_for_range<U: LedgerUow>(
    uow: &mut U,
    range: DateRange,
) -> Result<f64, ReportError> {
    let rows = uow
        .account_balances(&BalanceQuery::range(&TEMP_TYPES, range))
        .await?;
    Ok(rows.iter().fold(0.0, |sum, row| {
        let amount = row.signed_amount();
        if row.account.account_type == AccountType::Revenue {
            sum + amount
        } else {
            sum - amount
        }
    }))
}

/// Accumulated net income of every `pl_closed` period ending before the
/// given period's start.
pub async fn retained_earnings<U: LedgerUow>(
    uow: &mut U,
    period: &AccountingPeriod,
) -> Result<f64, ReportError> {
    let closed = uow.closed_pl_periods_before(period.start_date).await?;
    let mut retained = 0.0;
    for closed_period in closed {
        retained += net_income_for_range(uow, closed_period.range()).await?;
    }
    Ok(retained)
}

/// Signed balance of one account type as of a date, optionally narrowed to
/// accounts matching a selector.
async fn balance_as_of<U: LedgerUow>(
    uow: &mut U,
    to: NaiveDate,
    account_type: AccountType,
    selector: Option<AccountSelector>,
) -> Result<f64, ReportError> {
    let rows = uow
        .account_balances(&BalanceQuery::as_of(&[account_type], to))
        .await?;
    Ok(rows
        .iter()
        .filter(|row| selector.is_none_or(|s| s.matches(&row.account)))
        .map(AccountBalanceRow::signed_amount)
        .sum())
}

async fn balance_movement<U: LedgerUow>(
    uow: &mut U,
    range: DateRange,
    account_type: AccountType,
    selector: AccountSelector,
) -> Result<f64, ReportError> {
    let closing = balance_as_of(uow, range.end, account_type, Some(selector)).await?;
    let opening =
        balance_as_of(uow, range.day_before_start(), account_type, Some(selector)).await?;
    Ok(closing - opening)
}

/// Profit & loss over a period or explicit range.
///
/// Per-account amounts are clamped at zero so contra activity on the other
/// side of an account never shows as negative revenue or expense.
#[instrument(skip(uow))]
pub async fn profit_and_loss<U: LedgerUow>(
    uow: &mut U,
    span: ReportSpan,
) -> Result<ProfitAndLoss, ReportError> {
    let range = resolve_span(uow, span).await?;
    let rows = uow
        .account_balances(&BalanceQuery::range(
            &TEMP_TYPES,
            DateRange::new(range.start_date, range.end_date),
        ))
        .await?;

    let mut revenue_total = 0.0;
    let mut expense_total = 0.0;
    let mut breakdown = Vec::with_capacity(rows.len());
    for row in &rows {
        let amount = row.signed_amount().max(0.0);
        if row.account.account_type == AccountType::Revenue {
            revenue_total += amount;
        } else {
            expense_total += amount;
        }
        breakdown.push(ReportLine::from_row(row, round2(amount)));
    }

    Ok(ProfitAndLoss {
        range,
        revenue_total: round2(revenue_total),
        expense_total: round2(expense_total),
        net_profit: round2(revenue_total - expense_total),
        breakdown,
    })
}

/// Balance sheet as of a period's end, with balances accumulated from the
/// dawn of the ledger. Equity carries two synthetic lines: retained
/// earnings from previously closed periods, and the current period's own
/// net income (zero once the period itself is P&L-closed, since that
/// income has rolled forward).
#[instrument(skip(uow))]
pub async fn balance_sheet<U: LedgerUow>(
    uow: &mut U,
    period_id: i64,
) -> Result<BalanceSheet, ReportError> {
    let period = period_by_id(uow, period_id).await?;
    let range = ReportRange {
        start_date: period.start_date,
        end_date: period.end_date,
        period_name: Some(period.name.clone()),
    };

    let rows = uow
        .account_balances(&BalanceQuery::range(
            &BALANCE_SHEET_TYPES,
            DateRange::new(epoch_floor(), period.end_date),
        ))
        .await?;

    let section = |account_type: AccountType| -> (f64, Vec<ReportLine>) {
        let mut total = 0.0;
        let mut lines = Vec::new();
        for row in rows.iter().filter(|r| r.account.account_type == account_type) {
            let amount = row.signed_amount();
            total += amount;
            lines.push(ReportLine::from_row(row, round2(amount)));
        }
        (total, lines)
    };

    let (assets_total, assets) = section(AccountType::Asset);
    let (liabilities_total, liabilities) = section(AccountType::Liability);
    let (opening_equity, mut equity) = section(AccountType::Equity);

    let retained = round2(retained_earnings(uow, &period).await?);
    let current_income = if period.pl_closed {
        0.0
    } else {
        round2(net_income_for_range(uow, period.range()).await?)
    };

    equity.push(ReportLine {
        account_id: None,
        account_name: "Retained Earnings".into(),
        account_type: AccountType::Equity.as_str().into(),
        account_subtype: Some("Retained Earnings".into()),
        amount: retained,
    });
    equity.push(ReportLine {
        account_id: None,
        account_name: "Current Period Net Income".into(),
        account_type: AccountType::Equity.as_str().into(),
        account_subtype: Some("Current Period Result".into()),
        amount: current_income,
    });

    let assets_total = round2(assets_total);
    let liabilities_total = round2(liabilities_total);
    let equity_total = round2(round2(opening_equity) + retained + current_income);
    let imbalance_delta = round2(assets_total - (liabilities_total + equity_total));

    Ok(BalanceSheet {
        range,
        assets_total,
        liabilities_total,
        equity_total,
        retained_earnings: retained,
        current_period_net_income: current_income,
        balanced: money_eq(assets_total, liabilities_total + equity_total),
        imbalance_delta,
        assets,
        liabilities,
        equity,
    })
}

/// Indirect-method cash flow for a period.
///
/// The direct cash change (closing minus opening cash/bank balances) is
/// ground truth; the indirect reconstruction from net income, non-cash
/// adjustments, and working-capital deltas must reconcile against it.
/// `reconciliation_delta` is a correctness oracle over the dispatcher's
/// postings and is expected to be exactly zero.
#[instrument(skip(uow))]
pub async fn cash_flow<U: LedgerUow>(
    uow: &mut U,
    period_id: i64,
) -> Result<CashFlow, ReportError> {
    let period = period_by_id(uow, period_id).await?;
    let range = period.range();

    let net_income = net_income_for_range(uow, range).await?;

    let opening_cash = balance_as_of(
        uow,
        range.day_before_start(),
        AccountType::Asset,
        Some(AccountSelector::CashOrBank),
    )
    .await?;
    let closing_cash = balance_as_of(
        uow,
        range.end,
        AccountType::Asset,
        Some(AccountSelector::CashOrBank),
    )
    .await?;
    let net_cash_change = round2(closing_cash - opening_cash);

    let depreciation =
        balance_movement(uow, range, AccountType::Expense, AccountSelector::Depreciation)
            .await?;
    let amortization =
        balance_movement(uow, range, AccountType::Expense, AccountSelector::Amortization)
            .await?;
    let non_cash_adjustments = round2(depreciation + amortization);

    let ar_change =
        balance_movement(uow, range, AccountType::Asset, AccountSelector::Receivable).await?;
    let inventory_change = balance_movement(
        uow,
        range,
        AccountType::Asset,
        AccountSelector::InventorySubtype,
    )
    .await?;
    let ap_change =
        balance_movement(uow, range, AccountType::Liability, AccountSelector::Payable).await?;
    let working_capital_delta = round2(-ar_change - inventory_change + ap_change);

    let indirect_net_cash = round2(net_income + non_cash_adjustments + working_capital_delta);
    let reconciliation_delta = round2(indirect_net_cash - net_cash_change);

    Ok(CashFlow {
        range: ReportRange {
            start_date: period.start_date,
            end_date: period.end_date,
            period_name: Some(period.name),
        },
        net_income: round2(net_income),
        non_cash_adjustments,
        working_capital_delta,
        indirect_net_cash,
        opening_cash: round2(opening_cash),
        closing_cash: round2(closing_cash),
        net_cash_change,
        reconciled: money_eq(indirect_net_cash, net_cash_change),
        reconciliation_delta,
        operating_cash_flow: indirect_net_cash,
        investing_cash_flow: 0.0,
        financing_cash_flow: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, MemoryLedger};
    use anchorledger_accounting::{
        AccountRole, JournalLine, JournalStatus, NewJournalEntry, PeriodStatus,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn period(id: i64, month: u32, pl_closed: bool) -> AccountingPeriod {
        AccountingPeriod {
            id,
            name: format!("2025-{month:02}"),
            start_date: NaiveDate::from_ymd_opt(2025, month, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, month, 28).unwrap(),
            status: PeriodStatus::Open,
            pl_closed,
            inventory_closed: false,
            cash_closed: false,
            cash_closed_at: None,
            cash_closed_by: None,
        }
    }

    async fn post(
        uow: &mut crate::store::MemoryUow,
        date: NaiveDate,
        debit_account: i64,
        credit_account: i64,
        amount: f64,
    ) {
        let event_id = Uuid::now_v7();
        uow.insert_journal(&NewJournalEntry {
            entry_number: format!("JE-{event_id}"),
            entry_date: date,
            entry_type: "Receipt".into(),
            reference: None,
            description: "test posting".into(),
            status: JournalStatus::Posted,
            total_debit: amount,
            total_credit: amount,
            source_event_id: event_id,
            posted_at: Some(Utc::now()),
            lines: vec![
                JournalLine {
                    line_number: 1,
                    account_id: debit_account,
                    description: "debit".into(),
                    debit: amount,
                    credit: 0.0,
                    source_event_id: event_id,
                },
                JournalLine {
                    line_number: 2,
                    account_id: credit_account,
                    description: "credit".into(),
                    debit: 0.0,
                    credit: amount,
                    source_event_id: event_id,
                },
            ],
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn empty_period_reports_zeros() {
        let store = MemoryLedger::new().with_period(period(1, 6, false));
        let mut uow = store.begin().await.unwrap();

        let pl = profit_and_loss(&mut uow, ReportSpan::Period(1)).await.unwrap();
        assert_eq!(pl.revenue_total, 0.0);
        assert_eq!(pl.expense_total, 0.0);
        assert_eq!(pl.net_profit, 0.0);

        let bs = balance_sheet(&mut uow, 1).await.unwrap();
        assert!(bs.balanced);
        assert_eq!(bs.imbalance_delta, 0.0);

        let cf = cash_flow(&mut uow, 1).await.unwrap();
        assert!(cf.reconciled);
        assert_eq!(cf.net_cash_change, 0.0);
    }

    #[tokio::test]
    async fn missing_period_is_an_error() {
        let store = MemoryLedger::new();
        let mut uow = store.begin().await.unwrap();
        assert!(matches!(
            balance_sheet(&mut uow, 99).await,
            Err(ReportError::PeriodNotFound(99))
        ));
    }

    #[tokio::test]
    async fn net_income_subtracts_expense_side_accounts() {
        let store = MemoryLedger::new().with_period(period(1, 6, false));
        let mut uow = store.begin().await.unwrap();
        let ar = uow
            .ensure_account(&AccountRole::AccountsReceivable.spec())
            .await
            .unwrap();
        let revenue = uow.ensure_account(&AccountRole::Revenue.spec()).await.unwrap();
        let cogs = uow.ensure_account(&AccountRole::Cogs.spec()).await.unwrap();
        let transit = uow
            .ensure_account(&AccountRole::InventoryInTransit.spec())
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        post(&mut uow, date, ar, revenue, 60.0).await;
        post(&mut uow, date, cogs, transit, 25.0).await;

        let income = net_income_for_range(
            &mut uow,
            DateRange::new(
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 28).unwrap(),
            ),
        )
        .await
        .unwrap();
        assert_eq!(income, 35.0);

        let pl = profit_and_loss(&mut uow, ReportSpan::Period(1)).await.unwrap();
        assert_eq!(pl.revenue_total, 60.0);
        assert_eq!(pl.expense_total, 25.0);
        assert_eq!(pl.net_profit, 35.0);
    }

    #[tokio::test]
    async fn retained_earnings_rolls_up_closed_periods_only() {
        let store = MemoryLedger::new()
            .with_period(period(1, 4, true))
            .with_period(period(2, 5, false))
            .with_period(period(3, 6, false));
        let mut uow = store.begin().await.unwrap();
        let ar = uow
            .ensure_account(&AccountRole::AccountsReceivable.spec())
            .await
            .unwrap();
        let revenue = uow.ensure_account(&AccountRole::Revenue.spec()).await.unwrap();

        // Income in the closed April period and the open May period.
        post(&mut uow, NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(), ar, revenue, 100.0).await;
        post(&mut uow, NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(), ar, revenue, 40.0).await;

        let june = uow.period_by_id(3).await.unwrap().unwrap();
        // Only the pl_closed April period contributes.
        assert_eq!(retained_earnings(&mut uow, &june).await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn pl_clamps_contra_balances_at_zero() {
        let store = MemoryLedger::new().with_period(period(1, 6, false));
        let mut uow = store.begin().await.unwrap();
        let revenue = uow.ensure_account(&AccountRole::Revenue.spec()).await.unwrap();
        let ar = uow
            .ensure_account(&AccountRole::AccountsReceivable.spec())
            .await
            .unwrap();

        // A debit-heavy revenue account (net negative on its credit side).
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        post(&mut uow, date, revenue, ar, 30.0).await;

        let pl = profit_and_loss(&mut uow, ReportSpan::Period(1)).await.unwrap();
        assert_eq!(pl.revenue_total, 0.0);
        let row = pl
            .breakdown
            .iter()
            .find(|line| line.account_id == Some(revenue))
            .unwrap();
        assert_eq!(row.amount, 0.0);
    }
}

//! Accounting periods and the period guard.

use anchorledger_core::{LedgerError, LedgerResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Period lifecycle status. Anything other than `Open` blocks postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodStatus {
    Open,
    Closed,
    Locked,
}

impl PeriodStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Self::Open,
            "LOCKED" => Self::Locked,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Locked => "LOCKED",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// As-of date for opening balances.
    pub fn day_before_start(&self) -> NaiveDate {
        self.start.pred_opt().unwrap_or(self.start)
    }
}

/// One accounting period with its three independent closing flags.
///
/// Created administratively; mutated only by closing operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
    pub pl_closed: bool,
    pub inventory_closed: bool,
    pub cash_closed: bool,
    pub cash_closed_at: Option<DateTime<Utc>>,
    pub cash_closed_by: Option<String>,
}

impl AccountingPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.range().contains(date)
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

/// Which sub-ledgers a posting touches; drives the period guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostingImpact {
    pub inventory: bool,
    pub profit_and_loss: bool,
    pub cash: bool,
}

/// The period guard: resolve whether a posting with the given impact may
/// enter the period containing its event time.
///
/// Applied by the receiver before dispatch and re-applied by the dispatcher
/// (it may be invoked independently of the receiver).
pub fn check_period(
    period: Option<&AccountingPeriod>,
    impact: PostingImpact,
) -> LedgerResult<&AccountingPeriod> {
    let Some(period) = period else {
        return Err(LedgerError::period_closed(
            "no accounting period found for event_time",
        ));
    };

    if !period.status.is_open() {
        return Err(LedgerError::period_closed(format!(
            "period {} is {}",
            period.name,
            period.status.as_str()
        )));
    }

    if impact.inventory && period.inventory_closed {
        return Err(LedgerError::InventoryClosed {
            period_id: period.id,
        });
    }

    if impact.profit_and_loss && period.pl_closed {
        return Err(LedgerError::PlClosed {
            period_id: period.id,
        });
    }

    if impact.cash && period.cash_closed {
        return Err(LedgerError::period_closed(format!(
            "cash/bank sub-ledger is closed for period {}",
            period.name
        )));
    }

    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn missing_period_is_period_closed() {
        let err = check_period(None, PostingImpact::default()).unwrap_err();
        assert_eq!(err.reason_code(), anchorledger_core::ReasonCode::PeriodClosed);
    }

    #[test]
    fn non_open_status_blocks_everything() {
        let mut period = june();
        period.status = PeriodStatus::Closed;
        assert!(check_period(Some(&period), PostingImpact::default()).is_err());
    }

    #[test]
    fn closing_flags_only_block_matching_impacts() {
        let mut period = june();
        period.inventory_closed = true;

        let inventory = PostingImpact {
            inventory: true,
            ..Default::default()
        };
        let err = check_period(Some(&period), inventory).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InventoryClosed { period_id: 1 }
        );

        // A pure P&L posting still passes.
        let pl = PostingImpact {
            profit_and_loss: true,
            ..Default::default()
        };
        assert!(check_period(Some(&period), pl).is_ok());
    }

    #[test]
    fn cash_closed_blocks_cash_impacts() {
        let mut period = june();
        period.cash_closed = true;

        let cash = PostingImpact {
            cash: true,
            ..Default::default()
        };
        let err = check_period(Some(&period), cash).unwrap_err();
        assert_eq!(err.reason_code(), anchorledger_core::ReasonCode::PeriodClosed);
        assert!(check_period(Some(&period), PostingImpact::default()).is_ok());
    }

    #[test]
    fn date_range_day_before_start() {
        let range = june().range();
        assert_eq!(
            range.day_before_start(),
            NaiveDate::from_ymd_opt(2025, 5, 31).unwrap()
        );
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }
}

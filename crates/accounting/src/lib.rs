//! `anchorledger-accounting` — chart of accounts, accounting periods,
//! and the double-entry journal domain.

pub mod accounts;
pub mod journal;
pub mod periods;

pub use accounts::{
    Account, AccountBalanceRow, AccountRole, AccountSpec, AccountType, NormalBalance,
};
pub use journal::{
    entry_types, JournalEntry, JournalLine, JournalPlan, JournalStatus, NewJournalEntry,
    PlannedLine,
};
pub use periods::{check_period, AccountingPeriod, DateRange, PeriodStatus, PostingImpact};

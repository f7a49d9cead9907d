//! Ledger store: the unit-of-work seam over the relational schema.

pub mod memory;
pub mod postgres;
#[allow(clippy::module_inception)]
mod r#trait;

pub use memory::{MemoryLedger, MemoryUow};
pub use postgres::{PgLedger, PgUow};
pub use r#trait::{
    AccountSelector, BalanceQuery, BankReconciliationStatus, JournalCashProfile, LedgerStore,
    LedgerUow, NewCloseAudit, StoreError, StoredResponse,
};

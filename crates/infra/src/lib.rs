//! `anchorledger-infra` — the operational pipeline around the ledger
//! domain: the unit-of-work store seam (in-memory and Postgres), the event
//! receiver, the event dispatcher, the reporting engine, and the cash/bank
//! period closer.

pub mod closing;
pub mod dispatcher;
pub mod receiver;
pub mod reports;
pub mod store;
pub mod telemetry;


pub use dispatcher::{apply_event, EventError};
pub use receiver::{receive_event, receive_once, ProcessResult};
pub use store::{LedgerStore, LedgerUow, MemoryLedger, PgLedger, StoreError};

//! `anchorledger-core` — foundation for the Anchor event ledger.
//!
//! This crate contains **pure domain** primitives shared by every layer:
//! the reason-code taxonomy, the ledger error model, money rounding, and
//! the injectable clock / entry-number seams.

pub mod clock;
pub mod entry_number;
pub mod error;
pub mod money;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entry_number::{EntryNumberGenerator, SequentialEntryNumbers};
pub use error::{LedgerError, LedgerResult, ReasonCode};
pub use money::{money_eq, round2, within_cent};

//! `anchorledger-events` — the Anchor event envelope, payload validation,
//! cross-event sequencing rules, and the append-only event log.

pub mod envelope;
pub mod issues;
pub mod log;

pub use envelope::{AnchorEvent, EventItem, EventType, OrderLineInput};
pub use log::{EventLogEntry, EventOutcome};

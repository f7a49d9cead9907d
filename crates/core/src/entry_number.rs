//! Journal entry-number generation.
//!
//! Entry numbers are derived from the triggering event id plus a process
//! sequence, so they are unique by construction and tests can assert exact
//! identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of journal entry numbers.
///
/// Injected into the dispatcher rather than generated inline.
pub trait EntryNumberGenerator: Send + Sync {
    fn next_entry_number(&self, event_id: Uuid) -> String;
}

/// Deterministic generator: `JE-{event_id[..8]}-{seq:05}`.
#[derive(Debug, Default)]
pub struct SequentialEntryNumbers {
    counter: AtomicU64,
}

impl SequentialEntryNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seq: u64) -> Self {
        Self {
            counter: AtomicU64::new(seq),
        }
    }
}

impl EntryNumberGenerator for SequentialEntryNumbers {
    fn next_entry_number(&self, event_id: Uuid) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = event_id.simple().to_string();
        format!("JE-{}-{seq:05}", &id[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_numbers_are_deterministic_and_unique() {
        let generator = SequentialEntryNumbers::new();
        let event_id = Uuid::parse_str("0195f1f4-aaaa-7bbb-8ccc-0123456789ab").unwrap();

        assert_eq!(generator.next_entry_number(event_id), "JE-0195f1f4-00001");
        assert_eq!(generator.next_entry_number(event_id), "JE-0195f1f4-00002");
    }

    #[test]
    fn starting_offset_is_respected() {
        let generator = SequentialEntryNumbers::starting_at(41);
        let event_id = Uuid::nil();
        assert_eq!(generator.next_entry_number(event_id), "JE-00000000-00042");
    }
}

//! Double-entry journal domain.
//!
//! A [`JournalPlan`] is validated before anything is written: no line may
//! carry both a debit and a credit, and total debits must equal total
//! credits to the cent. Handlers build plans against logical
//! [`AccountRole`]s; the store layer resolves roles to account ids.

use anchorledger_core::{money_eq, round2, LedgerError, LedgerResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::AccountRole;

/// Entry-type labels stamped on journals (free-form, stable).
pub mod entry_types {
    pub const REVENUE_RECOGNITION: &str = "Revenue Recognition";
    pub const INVENTORY_TRANSFER: &str = "Inventory Transfer";
    pub const RECEIPT: &str = "Receipt";
    pub const SALES_RETURN: &str = "Sales Return";
    pub const REFUND: &str = "Refund";
}

/// Journal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalStatus {
    Draft,
    Posted,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Posted => "Posted",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("posted") {
            Self::Posted
        } else {
            Self::Draft
        }
    }

    pub fn is_posted(&self) -> bool {
        matches!(self, Self::Posted)
    }
}

/// One planned line, still addressed by logical role.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLine {
    pub role: AccountRole,
    pub debit: f64,
    pub credit: f64,
    pub description: Option<String>,
}

impl PlannedLine {
    pub fn debit(role: AccountRole, amount: f64) -> Self {
        Self {
            role,
            debit: amount,
            credit: 0.0,
            description: None,
        }
    }

    pub fn credit(role: AccountRole, amount: f64) -> Self {
        Self {
            role,
            debit: 0.0,
            credit: amount,
            description: None,
        }
    }
}

/// A validated, balanced journal ready for posting.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalPlan {
    entry_type: &'static str,
    description: String,
    reference: Option<String>,
    lines: Vec<PlannedLine>,
    total_debit: f64,
    total_credit: f64,
}

impl JournalPlan {
    /// Validate and build. Fails with `INVALID_PAYLOAD`-class errors when a
    /// line carries both sides or the totals differ to the cent; nothing is
    /// written on failure.
    pub fn balanced(
        entry_type: &'static str,
        description: impl Into<String>,
        reference: Option<String>,
        lines: Vec<PlannedLine>,
    ) -> LedgerResult<Self> {
        if lines.is_empty() {
            return Err(LedgerError::invalid_payload("journal must have lines"));
        }

        let mut total_debit = 0.0;
        let mut total_credit = 0.0;
        for line in &lines {
            if line.debit > 0.0 && line.credit > 0.0 {
                return Err(LedgerError::LineDebitAndCredit {
                    account: line.role.to_string(),
                });
            }
            total_debit += line.debit;
            total_credit += line.credit;
        }

        if !money_eq(total_debit, total_credit) {
            return Err(LedgerError::UnbalancedJournal {
                total_debit: round2(total_debit),
                total_credit: round2(total_credit),
            });
        }

        Ok(Self {
            entry_type,
            description: description.into(),
            reference,
            lines,
            total_debit,
            total_credit,
        })
    }

    pub fn entry_type(&self) -> &'static str {
        self.entry_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn lines(&self) -> &[PlannedLine] {
        &self.lines
    }

    pub fn total_debit(&self) -> f64 {
        self.total_debit
    }

    pub fn total_credit(&self) -> f64 {
        self.total_credit
    }
}

/// One persisted journal line. Debit XOR credit; stable `line_number`
/// ordering; stamped with the producing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub line_number: u32,
    pub account_id: i64,
    pub description: String,
    pub debit: f64,
    pub credit: f64,
    pub source_event_id: Uuid,
}

/// A journal entry as persisted (header + lines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub entry_type: String,
    pub reference: Option<String>,
    pub description: String,
    pub status: JournalStatus,
    pub total_debit: f64,
    pub total_credit: f64,
    pub source_event_id: Uuid,
    pub posted_at: Option<DateTime<Utc>>,
    pub lines: Vec<JournalLine>,
}

/// Insert form of a journal entry (id assigned by the store).
#[derive(Debug, Clone, PartialEq)]
pub struct NewJournalEntry {
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub entry_type: String,
    pub reference: Option<String>,
    pub description: String,
    pub status: JournalStatus,
    pub total_debit: f64,
    pub total_credit: f64,
    pub source_event_id: Uuid,
    pub posted_at: Option<DateTime<Utc>>,
    pub lines: Vec<JournalLine>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn balanced_plan_is_accepted() {
        let plan = JournalPlan::balanced(
            entry_types::RECEIPT,
            "Payment received",
            Some("SO-1".into()),
            vec![
                PlannedLine::debit(AccountRole::Cash, 60.0),
                PlannedLine::credit(AccountRole::AccountsReceivable, 60.0),
            ],
        )
        .unwrap();

        assert_eq!(plan.total_debit(), 60.0);
        assert_eq!(plan.total_credit(), 60.0);
        assert_eq!(plan.lines().len(), 2);
    }

    #[test]
    fn unbalanced_plan_is_rejected() {
        let err = JournalPlan::balanced(
            entry_types::RECEIPT,
            "off by a cent",
            None,
            vec![
                PlannedLine::debit(AccountRole::Cash, 10.00),
                PlannedLine::credit(AccountRole::AccountsReceivable, 10.02),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::UnbalancedJournal { .. }));
    }

    #[test]
    fn sub_cent_drift_still_balances() {
        // 3 x 0.1 accumulated in floats vs 0.3 on the other side.
        let debit = 0.1 + 0.1 + 0.1;
        let plan = JournalPlan::balanced(
            entry_types::RECEIPT,
            "drift",
            None,
            vec![
                PlannedLine::debit(AccountRole::Cash, debit),
                PlannedLine::credit(AccountRole::Revenue, 0.3),
            ],
        );
        assert!(plan.is_ok());
    }

    #[test]
    fn line_with_both_sides_is_rejected() {
        let err = JournalPlan::balanced(
            entry_types::RECEIPT,
            "both sides",
            None,
            vec![
                PlannedLine {
                    role: AccountRole::Cash,
                    debit: 10.0,
                    credit: 10.0,
                    description: None,
                },
            ],
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::LineDebitAndCredit { .. }));
    }

    #[test]
    fn empty_plan_is_rejected() {
        let err =
            JournalPlan::balanced(entry_types::RECEIPT, "empty", None, vec![]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPayload { .. }));
    }

    proptest! {
        /// Any plan built from mirrored debit/credit amounts validates, and
        /// its totals agree to the cent.
        #[test]
        fn mirrored_amounts_always_balance(
            amounts in prop::collection::vec(0.01f64..100_000.0, 1..8)
        ) {
            let mut lines = Vec::new();
            for amount in &amounts {
                lines.push(PlannedLine::debit(AccountRole::Inventory, *amount));
                lines.push(PlannedLine::credit(AccountRole::Cogs, *amount));
            }

            let plan = JournalPlan::balanced(
                entry_types::INVENTORY_TRANSFER,
                "prop",
                None,
                lines,
            ).unwrap();

            prop_assert!(anchorledger_core::money_eq(
                plan.total_debit(),
                plan.total_credit()
            ));
        }
    }
}

//! Chart of accounts: account kinds, normal balances, and the fixed
//! registry of logical account roles used by event handlers.

use serde::{Deserialize, Serialize};

/// High-level account kind (determines the default normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
    #[serde(rename = "COGS")]
    Cogs,
    SalesReturn,
}

impl AccountType {
    pub const ALL: [AccountType; 7] = [
        Self::Asset,
        Self::Liability,
        Self::Equity,
        Self::Revenue,
        Self::Expense,
        Self::Cogs,
        Self::SalesReturn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "Asset",
            Self::Liability => "Liability",
            Self::Equity => "Equity",
            Self::Revenue => "Revenue",
            Self::Expense => "Expense",
            Self::Cogs => "COGS",
            Self::SalesReturn => "SalesReturn",
        }
    }

    /// Case-insensitive, separator-tolerant parse ("SALES_RETURN",
    /// "SalesReturn" and "sales return" all match).
    pub fn parse(s: &str) -> Option<Self> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match folded.as_str() {
            "ASSET" => Some(Self::Asset),
            "LIABILITY" => Some(Self::Liability),
            "EQUITY" => Some(Self::Equity),
            "REVENUE" => Some(Self::Revenue),
            "EXPENSE" => Some(Self::Expense),
            "COGS" => Some(Self::Cogs),
            "SALESRETURN" => Some(Self::SalesReturn),
            _ => None,
        }
    }

    /// Temporary (P&L) accounts: cleared into retained earnings at close.
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Self::Revenue | Self::Expense | Self::Cogs | Self::SalesReturn
        )
    }
}

impl core::fmt::Display for AccountType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side an account naturally grows on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl NormalBalance {
    /// Default when the account row does not carry an explicit side.
    pub fn default_for(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Asset
            | AccountType::Expense
            | AccountType::Cogs
            | AccountType::SalesReturn => Self::Debit,
            _ => Self::Credit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBIT" => Some(Self::Debit),
            "CREDIT" => Some(Self::Credit),
            _ => None,
        }
    }
}

/// One row of the chart of accounts.
///
/// Immutable once referenced by postings; `subtype` is free text used for
/// semantic matching ("cash", "receivable", "clearing", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub subtype: Option<String>,
    pub normal_balance: Option<NormalBalance>,
}

impl Account {
    /// Explicit normal balance, or the default for the account type.
    pub fn normal_side(&self) -> NormalBalance {
        self.normal_balance
            .unwrap_or_else(|| NormalBalance::default_for(self.account_type))
    }

    pub fn subtype_contains(&self, needle: &str) -> bool {
        self.subtype
            .as_deref()
            .is_some_and(|s| s.to_ascii_lowercase().contains(needle))
    }

    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.to_ascii_lowercase().contains(needle)
    }
}

/// Summed posted debits/credits for one account over some range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalanceRow {
    pub account: Account,
    pub debit: f64,
    pub credit: f64,
}

impl AccountBalanceRow {
    /// Signed balance: debit-normal accounts grow with debits, credit-normal
    /// accounts grow with credits.
    pub fn signed_amount(&self) -> f64 {
        match self.account.normal_side() {
            NormalBalance::Debit => self.debit - self.credit,
            NormalBalance::Credit => self.credit - self.debit,
        }
    }
}

/// Logical account roles the event handlers post against.
///
/// A closed set resolved into concrete account ids once per transaction;
/// call sites never deal in code strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountRole {
    Cash,
    AccountsReceivable,
    Inventory,
    InventoryInTransit,
    Revenue,
    Cogs,
    SalesReturns,
    SalesReturnsAllowance,
}

/// Canonical code/name/type/subtype for a logical role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSpec {
    pub code: &'static str,
    pub name: &'static str,
    pub account_type: AccountType,
    pub subtype: &'static str,
}

impl AccountRole {
    pub const ALL: [AccountRole; 8] = [
        Self::Cash,
        Self::AccountsReceivable,
        Self::Inventory,
        Self::InventoryInTransit,
        Self::Revenue,
        Self::Cogs,
        Self::SalesReturns,
        Self::SalesReturnsAllowance,
    ];

    pub fn spec(self) -> AccountSpec {
        match self {
            Self::Cash => AccountSpec {
                code: "1110",
                name: "Cash and Cash Equivalents",
                account_type: AccountType::Asset,
                subtype: "Cash",
            },
            Self::AccountsReceivable => AccountSpec {
                code: "1300",
                name: "Accounts Receivable",
                account_type: AccountType::Asset,
                subtype: "Accounts Receivable",
            },
            Self::Inventory => AccountSpec {
                code: "1400",
                name: "Inventory",
                account_type: AccountType::Asset,
                subtype: "Inventory",
            },
            Self::InventoryInTransit => AccountSpec {
                code: "1450",
                name: "Inventory In-Transit",
                account_type: AccountType::Asset,
                subtype: "Inventory",
            },
            Self::Revenue => AccountSpec {
                code: "4100",
                name: "Sales Revenue",
                account_type: AccountType::Revenue,
                subtype: "Sales",
            },
            Self::Cogs => AccountSpec {
                code: "5100",
                name: "Cost of Goods Sold",
                account_type: AccountType::Expense,
                subtype: "COGS",
            },
            Self::SalesReturns => AccountSpec {
                code: "4190",
                name: "Sales Returns",
                account_type: AccountType::Revenue,
                subtype: "Sales",
            },
            Self::SalesReturnsAllowance => AccountSpec {
                code: "4195",
                name: "Sales Returns Allowance",
                account_type: AccountType::Revenue,
                subtype: "Sales",
            },
        }
    }
}

impl core::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.spec().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(account_type: AccountType, normal_balance: Option<NormalBalance>) -> Account {
        Account {
            id: 1,
            code: "1000".into(),
            name: "Test".into(),
            account_type,
            subtype: None,
            normal_balance,
        }
    }

    #[test]
    fn normal_balance_defaults_by_type() {
        assert_eq!(
            NormalBalance::default_for(AccountType::Asset),
            NormalBalance::Debit
        );
        assert_eq!(
            NormalBalance::default_for(AccountType::Cogs),
            NormalBalance::Debit
        );
        assert_eq!(
            NormalBalance::default_for(AccountType::SalesReturn),
            NormalBalance::Debit
        );
        assert_eq!(
            NormalBalance::default_for(AccountType::Liability),
            NormalBalance::Credit
        );
        assert_eq!(
            NormalBalance::default_for(AccountType::Revenue),
            NormalBalance::Credit
        );
    }

    #[test]
    fn signed_amount_follows_normal_side() {
        let debit_row = AccountBalanceRow {
            account: account(AccountType::Asset, None),
            debit: 100.0,
            credit: 40.0,
        };
        assert_eq!(debit_row.signed_amount(), 60.0);

        let credit_row = AccountBalanceRow {
            account: account(AccountType::Revenue, None),
            debit: 10.0,
            credit: 110.0,
        };
        assert_eq!(credit_row.signed_amount(), 100.0);

        // Explicit normal balance beats the type default.
        let contra = AccountBalanceRow {
            account: account(AccountType::Asset, Some(NormalBalance::Credit)),
            debit: 10.0,
            credit: 30.0,
        };
        assert_eq!(contra.signed_amount(), 20.0);
    }

    #[test]
    fn account_type_parse_is_tolerant() {
        assert_eq!(AccountType::parse("SALES_RETURN"), Some(AccountType::SalesReturn));
        assert_eq!(AccountType::parse("cogs"), Some(AccountType::Cogs));
        assert_eq!(AccountType::parse("Asset"), Some(AccountType::Asset));
        assert_eq!(AccountType::parse("Bank"), None);
    }

    #[test]
    fn role_registry_matches_the_canonical_chart() {
        let cash = AccountRole::Cash.spec();
        assert_eq!(cash.code, "1110");
        assert_eq!(cash.account_type, AccountType::Asset);
        assert_eq!(AccountRole::SalesReturnsAllowance.spec().code, "4195");
        assert_eq!(AccountRole::Cogs.spec().account_type, AccountType::Expense);

        // Codes are unique across the registry.
        let mut codes: Vec<_> = AccountRole::ALL.iter().map(|r| r.spec().code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), AccountRole::ALL.len());
    }
}

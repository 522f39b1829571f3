//! Chart of accounts and account roles
//!
//! The engine does not interpret account codes beyond their classification
//! (used for profit aggregation) and the role mapping in
//! [`LedgerConfig`](crate::config::LedgerConfig).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Classification of a ledger account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountClass {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Income accounts (credit normal balance)
    Income,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountClass {
    /// Returns true if this class has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountClass::Asset | AccountClass::Expense)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountClass::Asset => "ASSET",
            AccountClass::Liability => "LIABILITY",
            AccountClass::Equity => "EQUITY",
            AccountClass::Income => "INCOME",
            AccountClass::Expense => "EXPENSE",
        }
    }
}

impl FromStr for AccountClass {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSET" => Ok(AccountClass::Asset),
            "LIABILITY" => Ok(AccountClass::Liability),
            "EQUITY" => Ok(AccountClass::Equity),
            "INCOME" => Ok(AccountClass::Income),
            "EXPENSE" => Ok(AccountClass::Expense),
            other => Err(LedgerError::validation(format!("unknown account class {other}"))),
        }
    }
}

/// Named roles the engine posts to, resolved to account codes by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountRole {
    #[serde(rename = "BANK", alias = "bank")]
    Bank,
    #[serde(rename = "AR", alias = "ar")]
    Receivable,
    #[serde(rename = "AP", alias = "ap")]
    Payable,
    #[serde(rename = "VAT_OUT", alias = "vat_out")]
    VatOutput,
    #[serde(rename = "VAT_IN", alias = "vat_in")]
    VatInput,
    #[serde(rename = "TAX_CORP_PAYABLE", alias = "tax_corp_payable")]
    CorporateTaxPayable,
    #[serde(rename = "TAX_CORP_EXP", alias = "tax_corp_exp")]
    CorporateTaxExpense,
    #[serde(rename = "FX_GAIN", alias = "fx_gain")]
    FxGain,
    #[serde(rename = "FX_LOSS", alias = "fx_loss")]
    FxLoss,
}

impl AccountRole {
    pub const ALL: [AccountRole; 9] = [
        AccountRole::Bank,
        AccountRole::Receivable,
        AccountRole::Payable,
        AccountRole::VatOutput,
        AccountRole::VatInput,
        AccountRole::CorporateTaxPayable,
        AccountRole::CorporateTaxExpense,
        AccountRole::FxGain,
        AccountRole::FxLoss,
    ];

    /// Configuration key of the role
    pub fn code(&self) -> &'static str {
        match self {
            AccountRole::Bank => "BANK",
            AccountRole::Receivable => "AR",
            AccountRole::Payable => "AP",
            AccountRole::VatOutput => "VAT_OUT",
            AccountRole::VatInput => "VAT_IN",
            AccountRole::CorporateTaxPayable => "TAX_CORP_PAYABLE",
            AccountRole::CorporateTaxExpense => "TAX_CORP_EXP",
            AccountRole::FxGain => "FX_GAIN",
            AccountRole::FxLoss => "FX_LOSS",
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account code (e.g., "1100")
    pub code: String,
    /// Account name
    pub name: String,
    /// Classification
    pub class: AccountClass,
    /// Parent account code (for hierarchical charts)
    pub parent_code: Option<String>,
    /// Whether account is active
    pub is_active: bool,
}

impl Account {
    /// Creates a new active account
    pub fn new(code: impl Into<String>, name: impl Into<String>, class: AccountClass) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            class,
            parent_code: None,
            is_active: true,
        }
    }

    /// Sets the parent account
    pub fn with_parent(mut self, parent_code: impl Into<String>) -> Self {
        self.parent_code = Some(parent_code.into());
        self
    }
}

/// Standard trading chart of accounts matching the default role mapping
pub struct StandardChartOfAccounts;

impl StandardChartOfAccounts {
    pub fn create_standard_accounts() -> Vec<Account> {
        vec![
            // Assets
            Account::new("1000", "Bank", AccountClass::Asset),
            Account::new("1100", "Accounts Receivable", AccountClass::Asset),
            Account::new("1200", "VAT Input", AccountClass::Asset),

            // Liabilities
            Account::new("2000", "Accounts Payable", AccountClass::Liability),
            Account::new("2100", "VAT Output", AccountClass::Liability),
            Account::new("2200", "Corporate Tax Payable", AccountClass::Liability),

            // Equity
            Account::new("3000", "Retained Earnings", AccountClass::Equity),

            // Income
            Account::new("4000", "Sales", AccountClass::Income),
            Account::new("4900", "FX Gain", AccountClass::Income),

            // Expenses
            Account::new("5000", "Purchases", AccountClass::Expense),
            Account::new("5900", "FX Loss", AccountClass::Expense),
            Account::new("6900", "Corporate Tax Expense", AccountClass::Expense),
        ]
    }
}

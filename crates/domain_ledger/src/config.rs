//! Ledger configuration
//!
//! The configuration is an explicit value handed to the ledger at
//! construction; two ledgers with different mappings can run side by side.

use serde::{Deserialize, Serialize};
use std::path::Path;

use core_kernel::{Currency, RateType};

use crate::account::AccountRole;
use crate::error::LedgerError;
use crate::tax::CorporateTaxRule;

/// Role to account-code mapping
///
/// Roles missing from a loaded mapping keep their standard code; a blank code
/// unmaps the role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMapping {
    pub bank: Option<String>,
    pub ar: Option<String>,
    pub ap: Option<String>,
    pub vat_out: Option<String>,
    pub vat_in: Option<String>,
    pub tax_corp_payable: Option<String>,
    pub tax_corp_exp: Option<String>,
    pub fx_gain: Option<String>,
    pub fx_loss: Option<String>,
}

impl AccountMapping {
    /// Mapping onto the standard chart of accounts
    pub fn standard() -> Self {
        Self {
            bank: Some("1000".into()),
            ar: Some("1100".into()),
            vat_in: Some("1200".into()),
            ap: Some("2000".into()),
            vat_out: Some("2100".into()),
            tax_corp_payable: Some("2200".into()),
            fx_gain: Some("4900".into()),
            fx_loss: Some("5900".into()),
            tax_corp_exp: Some("6900".into()),
        }
    }

    fn slot(&mut self, role: AccountRole) -> &mut Option<String> {
        match role {
            AccountRole::Bank => &mut self.bank,
            AccountRole::Receivable => &mut self.ar,
            AccountRole::Payable => &mut self.ap,
            AccountRole::VatOutput => &mut self.vat_out,
            AccountRole::VatInput => &mut self.vat_in,
            AccountRole::CorporateTaxPayable => &mut self.tax_corp_payable,
            AccountRole::CorporateTaxExpense => &mut self.tax_corp_exp,
            AccountRole::FxGain => &mut self.fx_gain,
            AccountRole::FxLoss => &mut self.fx_loss,
        }
    }

    pub fn get(&self, role: AccountRole) -> Option<&str> {
        let code = match role {
            AccountRole::Bank => &self.bank,
            AccountRole::Receivable => &self.ar,
            AccountRole::Payable => &self.ap,
            AccountRole::VatOutput => &self.vat_out,
            AccountRole::VatInput => &self.vat_in,
            AccountRole::CorporateTaxPayable => &self.tax_corp_payable,
            AccountRole::CorporateTaxExpense => &self.tax_corp_exp,
            AccountRole::FxGain => &self.fx_gain,
            AccountRole::FxLoss => &self.fx_loss,
        };
        code.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn set(&mut self, role: AccountRole, code: Option<String>) {
        *self.slot(role) = code;
    }
}

impl Default for AccountMapping {
    fn default() -> Self {
        Self::standard()
    }
}

/// General ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Currency every journal entry is booked in
    pub base_currency: Currency,
    /// Rate type used for every lookup
    pub rate_type: RateType,
    /// Fail settlement when an FX difference cannot be booked
    pub strict_fx: bool,
    pub accounts: AccountMapping,
    pub corporate_tax: Vec<CorporateTaxRule>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::USD,
            rate_type: RateType::Spot,
            strict_fx: false,
            accounts: AccountMapping::standard(),
            corporate_tax: Vec::new(),
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from an optional file and `LEDGER__*` environment variables
    ///
    /// e.g. `LEDGER__BASE_CURRENCY=AED`, `LEDGER__ACCOUNTS__FX_GAIN=4910`.
    /// Unset values keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("LEDGER").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn with_base_currency(mut self, currency: Currency) -> Self {
        self.base_currency = currency;
        self
    }

    pub fn with_strict_fx(mut self, strict: bool) -> Self {
        self.strict_fx = strict;
        self
    }

    pub fn with_account(mut self, role: AccountRole, code: impl Into<String>) -> Self {
        self.accounts.set(role, Some(code.into()));
        self
    }

    pub fn without_account(mut self, role: AccountRole) -> Self {
        self.accounts.set(role, None);
        self
    }

    pub fn with_tax_rule(mut self, rule: CorporateTaxRule) -> Self {
        self.corporate_tax.retain(|r| r.country != rule.country);
        self.corporate_tax.push(rule);
        self
    }

    /// Account code for a role, or `MissingAccount`
    pub fn account_for(&self, role: AccountRole) -> Result<&str, LedgerError> {
        self.accounts.get(role).ok_or(LedgerError::MissingAccount(role))
    }

    /// Account code for an optional role
    pub fn optional_account(&self, role: AccountRole) -> Option<&str> {
        self.accounts.get(role)
    }

    /// Corporate tax rule for a country, or `MissingTaxRule`
    pub fn tax_rule(&self, country: &str) -> Result<&CorporateTaxRule, LedgerError> {
        self.corporate_tax
            .iter()
            .find(|r| r.country.eq_ignore_ascii_case(country))
            .ok_or_else(|| LedgerError::MissingTaxRule(country.to_string()))
    }
}

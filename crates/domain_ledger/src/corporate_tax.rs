//! Corporate Tax Accrual Service
//!
//! Aggregates period profit from posted lines and accrues tax against the
//! configured rule. Each (country, period, scope) has at most one filing,
//! moving ACCRUED -> FILED, or ACCRUED -> REVERSED and back to ACCRUED.
//! FILED is a hard lock; only `accrue` with `override_lock` may supersede it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use core_kernel::{round2, TaxFilingId};

use crate::account::{AccountClass, AccountRole};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::journal::{EntrySource, JournalDraft, JournalEntry};
use crate::ports::{LedgerStore, LedgerTransaction, LineQuery, PostedLine};
use crate::posting::ensure_accounts;
use crate::reversal::reverse_in;
use crate::tax::{CorporateTaxFiling, CorporateTaxRule, FilingState, TaxComputation, TaxPeriodKey};

/// Result of an accrual request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualOutcome {
    /// The period's filing; `None` when no tax was ever due for it
    pub filing: Option<CorporateTaxFiling>,
    /// Accrual entry; `None` when profit does not exceed the threshold
    pub entry: Option<JournalEntry>,
    pub computation: TaxComputation,
}

#[derive(Clone)]
pub struct CorporateTaxService {
    store: Arc<dyn LedgerStore>,
    config: Arc<LedgerConfig>,
}

impl CorporateTaxService {
    pub fn new(store: Arc<dyn LedgerStore>, config: Arc<LedgerConfig>) -> Self {
        Self { store, config }
    }

    /// Accrues corporate tax for a period
    ///
    /// # Arguments
    ///
    /// * `country` - Country whose rule applies
    /// * `from` / `to` - Inclusive period bounds; the entry is dated `to`
    /// * `scope` - Organisation partition; `None` aggregates every scope
    /// * `override_lock` - Supersede a FILED period (reverses its accrual first)
    ///
    /// # Errors
    ///
    /// - `PeriodLocked` when the period is FILED and `override_lock` is false
    /// - `MissingTaxRule` when no rule exists for `country`
    #[instrument(skip(self))]
    pub async fn accrue(
        &self,
        country: &str,
        from: NaiveDate,
        to: NaiveDate,
        scope: Option<String>,
        override_lock: bool,
    ) -> Result<AccrualOutcome, LedgerError> {
        if from > to {
            return Err(LedgerError::validation(format!("period start {from} is after end {to}")));
        }
        let rule = self.config.tax_rule(country)?.clone();
        let key = TaxPeriodKey::new(rule.country.to_ascii_uppercase(), from, to, scope);

        let mut tx = self.store.begin().await?;
        let mut filing = tx.lock_tax_filing(&key).await?;

        let mut superseded = None;
        if let Some(existing) = &filing {
            match existing.state {
                FilingState::Filed if !override_lock => {
                    return Err(LedgerError::PeriodLocked(key.to_string()));
                }
                FilingState::Accrued => {
                    if let Some(entry_id) = existing.accrual_entry {
                        debug!(filing = %existing.id, entry = %entry_id, "Period already accrued");
                        let entry = tx.journal_entry(entry_id).await?;
                        return Ok(AccrualOutcome {
                            filing: Some(existing.clone()),
                            entry,
                            computation: existing.computation,
                        });
                    }
                }
                FilingState::Filed => {
                    if let Some(entry_id) = existing.accrual_entry {
                        let reversal = reverse_in(tx.as_mut(), entry_id).await?;
                        info!(filing = %existing.id, reversal = %reversal.id, "Filed accrual reversed under override");
                        superseded = Some(reversal.id);
                    }
                }
                FilingState::Reversed => {}
            }
        }

        let lines = tx.posted_lines(&LineQuery::between(Some(from), Some(to)).in_scope(key.scope.clone())).await?;
        let tax_expense = self.config.optional_account(AccountRole::CorporateTaxExpense);
        let profit = period_profit(&lines, tax_expense);
        let computation = rule.compute(profit);

        if !computation.is_taxable() {
            if let (Some(existing), Some(reversal)) = (filing.as_mut(), superseded) {
                existing.computation = computation;
                existing.mark_reversed(reversal);
                tx.save_tax_filing(existing).await?;
            }
            tx.commit().await?;
            info!(%key, profit = %computation.profit, "No corporate tax due");
            return Ok(AccrualOutcome {
                filing,
                entry: None,
                computation,
            });
        }

        let filing_id = filing.as_ref().map(|f| f.id).unwrap_or_else(TaxFilingId::new);
        let entry = self
            .post_accrual(tx.as_mut(), &key, &rule, &computation, filing_id)
            .await?;

        let filing = match filing {
            Some(mut existing) => {
                existing.reaccrue(computation, entry.id);
                existing
            }
            None => CorporateTaxFiling::accrued(filing_id, key.clone(), computation, entry.id),
        };
        tx.save_tax_filing(&filing).await?;
        tx.commit().await?;

        info!(
            filing = %filing.id,
            entry = %entry.id,
            profit = %computation.profit,
            tax = %computation.tax,
            "Corporate tax accrued"
        );
        Ok(AccrualOutcome {
            filing: Some(filing),
            entry: Some(entry),
            computation,
        })
    }

    /// Files an accrued period, locking it
    #[instrument(skip(self), fields(filing = %id))]
    pub async fn file(&self, id: TaxFilingId) -> Result<CorporateTaxFiling, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut filing = tx.lock_tax_filing_by_id(id).await?;
        filing.file()?;
        tx.save_tax_filing(&filing).await?;
        tx.commit().await?;

        info!(key = %filing.key, "Corporate tax filed");
        Ok(filing)
    }

    /// Reverses the accrual of a period that has not been filed
    #[instrument(skip(self), fields(filing = %id))]
    pub async fn reverse(&self, id: TaxFilingId) -> Result<CorporateTaxFiling, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut filing = tx.lock_tax_filing_by_id(id).await?;

        let accrual = match (filing.state, filing.accrual_entry) {
            (FilingState::Filed, _) => return Err(LedgerError::PeriodLocked(filing.key.to_string())),
            (FilingState::Accrued, Some(entry)) => entry,
            (state, _) => return Err(LedgerError::invalid_transition(state, FilingState::Reversed)),
        };

        let reversal = reverse_in(tx.as_mut(), accrual).await?;
        filing.mark_reversed(reversal.id);
        tx.save_tax_filing(&filing).await?;
        tx.commit().await?;

        info!(key = %filing.key, reversal = %reversal.id, "Corporate tax reversed");
        Ok(filing)
    }

    async fn post_accrual(
        &self,
        tx: &mut dyn LedgerTransaction,
        key: &TaxPeriodKey,
        rule: &CorporateTaxRule,
        computation: &TaxComputation,
        filing_id: TaxFilingId,
    ) -> Result<JournalEntry, LedgerError> {
        let expense = self.config.account_for(AccountRole::CorporateTaxExpense)?;
        let payable = self.config.account_for(AccountRole::CorporateTaxPayable)?;

        let memo = format!(
            "Corporate tax {key}: profit {}, base {} @ {}%",
            computation.profit,
            computation.taxable_base,
            rule.rate_percent.normalize()
        );
        let draft = JournalDraft::new(key.period_end, self.config.base_currency, memo, EntrySource::CorporateTax(filing_id))
            .scope(key.scope.clone())
            .fiscal_period(format!("{}..{}", key.period_start, key.period_end))
            .debit(expense, computation.tax)
            .credit(payable, computation.tax);

        ensure_accounts(tx, &draft).await?;
        let entry = draft.post()?;
        tx.insert_journal_entry(&entry).await?;
        Ok(entry)
    }
}

/// Income net credits minus expense net debits, excluding the tax expense account
pub fn period_profit(lines: &[PostedLine], tax_expense_account: Option<&str>) -> Decimal {
    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    for line in lines {
        if Some(line.account_code.as_str()) == tax_expense_account {
            continue;
        }
        match line.account_class {
            Some(AccountClass::Income) => income += line.credit - line.debit,
            Some(AccountClass::Expense) => expense += line.debit - line.credit,
            _ => {}
        }
    }
    round2(income - expense)
}

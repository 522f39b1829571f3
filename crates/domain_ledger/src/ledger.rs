//! General ledger facade
//!
//! Wires the services over one store, rate source and configuration. Several
//! ledgers with different configurations can share a process.

use chrono::NaiveDate;
use std::sync::Arc;

use core_kernel::{
    DocumentId, HealthCheckResult, JournalEntryId, PaymentId, RateSource, TaxFilingId,
};

use crate::config::LedgerConfig;
use crate::corporate_tax::{AccrualOutcome, CorporateTaxService};
use crate::error::LedgerError;
use crate::journal::JournalEntry;
use crate::ports::LedgerStore;
use crate::posting::{PostingOutcome, PostingService};
use crate::reporting::{AgingQuery, AgingReport, ReportingService, TrialBalance};
use crate::reversal::ReversalService;
use crate::settlement::{SettlementOutcome, SettlementService};
use crate::tax::CorporateTaxFiling;

/// Entry point for collaborators
///
/// # Example
///
/// ```rust,ignore
/// let ledger = GeneralLedger::new(store, rates, LedgerConfig::default());
/// let posted = ledger.post_document(invoice.id).await?;
/// let settled = ledger.post_payment(receipt.id).await?;
/// ```
#[derive(Clone)]
pub struct GeneralLedger {
    store: Arc<dyn LedgerStore>,
    config: Arc<LedgerConfig>,
    posting: PostingService,
    settlement: SettlementService,
    reversal: ReversalService,
    corporate_tax: CorporateTaxService,
    reporting: ReportingService,
}

impl GeneralLedger {
    pub fn new(store: Arc<dyn LedgerStore>, rates: Arc<dyn RateSource>, config: LedgerConfig) -> Self {
        let config = Arc::new(config);
        Self {
            posting: PostingService::new(Arc::clone(&store), Arc::clone(&rates), Arc::clone(&config)),
            settlement: SettlementService::new(Arc::clone(&store), Arc::clone(&rates), Arc::clone(&config)),
            reversal: ReversalService::new(Arc::clone(&store)),
            corporate_tax: CorporateTaxService::new(Arc::clone(&store), Arc::clone(&config)),
            reporting: ReportingService::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Posts a document; returns the existing entry when already posted
    pub async fn post_document(&self, id: DocumentId) -> Result<PostingOutcome, LedgerError> {
        self.posting.post_document(id).await
    }

    pub async fn unpost_document(&self, id: DocumentId) -> Result<Option<JournalEntryId>, LedgerError> {
        self.posting.unpost_document(id).await
    }

    pub async fn reverse_and_unpost_document(&self, id: DocumentId) -> Result<JournalEntry, LedgerError> {
        self.posting.reverse_and_unpost_document(id).await
    }

    /// Settles a payment; returns the existing entry when already posted
    pub async fn post_payment(&self, id: PaymentId) -> Result<SettlementOutcome, LedgerError> {
        self.settlement.post_payment(id).await
    }

    pub async fn unpost_payment(&self, id: PaymentId) -> Result<Option<JournalEntryId>, LedgerError> {
        self.settlement.unpost_payment(id).await
    }

    pub async fn reverse_and_unpost_payment(&self, id: PaymentId) -> Result<JournalEntry, LedgerError> {
        self.settlement.reverse_and_unpost_payment(id).await
    }

    pub async fn reverse_journal(&self, id: JournalEntryId) -> Result<JournalEntry, LedgerError> {
        self.reversal.reverse_journal(id).await
    }

    pub async fn accrue_corporate_tax(
        &self,
        country: &str,
        from: NaiveDate,
        to: NaiveDate,
        scope: Option<String>,
    ) -> Result<AccrualOutcome, LedgerError> {
        self.corporate_tax.accrue(country, from, to, scope, false).await
    }

    /// Accrues over a FILED period, reversing its previous accrual
    pub async fn override_corporate_tax(
        &self,
        country: &str,
        from: NaiveDate,
        to: NaiveDate,
        scope: Option<String>,
    ) -> Result<AccrualOutcome, LedgerError> {
        self.corporate_tax.accrue(country, from, to, scope, true).await
    }

    pub async fn file_corporate_tax(&self, id: TaxFilingId) -> Result<CorporateTaxFiling, LedgerError> {
        self.corporate_tax.file(id).await
    }

    pub async fn reverse_corporate_tax(&self, id: TaxFilingId) -> Result<CorporateTaxFiling, LedgerError> {
        self.corporate_tax.reverse(id).await
    }

    pub async fn build_trial_balance(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<TrialBalance, LedgerError> {
        self.reporting.build_trial_balance(from, to).await
    }

    pub async fn build_aging_report(&self, query: AgingQuery) -> Result<AgingReport, LedgerError> {
        self.reporting.build_aging_report(query).await
    }

    pub async fn health_check(&self) -> HealthCheckResult {
        self.store.health_check().await
    }
}

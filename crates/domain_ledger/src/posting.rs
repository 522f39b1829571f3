//! Posting Service
//!
//! Turns a document and its precomputed GL distribution lines into one
//! balanced journal entry in the base currency.
//!
//! # Idempotence
//!
//! The document row is locked before its `gl_journal` link is inspected, so
//! concurrent posting attempts serialize: the first creates the entry and the
//! others return it with `created == false`.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use core_kernel::{resolve_exchange_rate, round2, DocumentId, JournalEntryId, RateSource};

use crate::config::LedgerConfig;
use crate::document::{Document, PaymentStatus};
use crate::error::LedgerError;
use crate::journal::{DraftLine, EntrySource, JournalDraft, JournalEntry};
use crate::ports::{LedgerStore, LedgerTransaction};
use crate::reversal::reverse_in;

/// Result of posting a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingOutcome {
    pub entry: JournalEntry,
    /// `false` when the document was already posted
    pub created: bool,
}

/// Posts documents to the ledger
#[derive(Clone)]
pub struct PostingService {
    store: Arc<dyn LedgerStore>,
    rates: Arc<dyn RateSource>,
    config: Arc<LedgerConfig>,
}

impl PostingService {
    pub fn new(store: Arc<dyn LedgerStore>, rates: Arc<dyn RateSource>, config: Arc<LedgerConfig>) -> Self {
        Self { store, rates, config }
    }

    /// Posts a document in its own transaction
    ///
    /// # Errors
    ///
    /// - `EmptyDocument`, `ZeroTotal`, `MissingDistribution` for incomplete documents
    /// - `Fx(RateNotFound)` when the document currency cannot be converted
    /// - `UnknownAccount` when a distribution line names an account outside the chart
    /// - `Unbalanced` when the converted lines do not balance
    ///
    /// Nothing is written on error.
    #[instrument(skip(self), fields(document = %id))]
    pub async fn post_document(&self, id: DocumentId) -> Result<PostingOutcome, LedgerError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.post_in(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Posts a document inside an open transaction
    pub async fn post_in(
        &self,
        tx: &mut dyn LedgerTransaction,
        id: DocumentId,
    ) -> Result<PostingOutcome, LedgerError> {
        let mut document = tx.lock_document(id).await?;

        if let Some(existing) = document.gl_journal {
            debug!(entry = %existing, "Document already posted");
            let entry = tx
                .journal_entry(existing)
                .await?
                .ok_or_else(|| LedgerError::not_found("JournalEntry", existing))?;
            return Ok(PostingOutcome { entry, created: false });
        }

        if document.line_items.is_empty() {
            return Err(LedgerError::EmptyDocument(document.number.clone()));
        }

        // Tax is computed in document currency; only the total is converted
        let totals = document.compute_totals();
        if totals.total.is_zero() {
            return Err(LedgerError::ZeroTotal(document.number.clone()));
        }
        if document.distribution.is_empty() {
            return Err(LedgerError::MissingDistribution(document.number.clone()));
        }

        let base = self.config.base_currency;
        let rate = resolve_exchange_rate(
            self.rates.as_ref(),
            document.currency,
            base,
            document.date,
            self.config.rate_type,
        )
        .await?;
        let base_total = round2(totals.total * rate);

        let draft = build_draft(&document, base, rate);
        ensure_accounts(tx, &draft).await?;
        let entry = draft.post()?;
        tx.insert_journal_entry(&entry).await?;

        document.subtotal = totals.subtotal;
        document.tax = totals.tax;
        document.total = totals.total;
        document.balance = round2(document.total - document.paid);
        document.payment_status = PaymentStatus::from_amounts(document.paid, document.balance);
        document.exchange_rate = Some(rate);
        document.base_currency_total = Some(base_total);
        document.gl_journal = Some(entry.id);
        document.posted_at = Some(Utc::now());
        tx.save_document(&document).await?;

        info!(
            entry = %entry.id,
            number = %document.number,
            total = %document.total,
            %base_total,
            "Document posted"
        );
        Ok(PostingOutcome { entry, created: true })
    }

    /// Clears a document's posting link without touching the ledger
    ///
    /// The previous entry stays in the ledger; use
    /// [`reverse_and_unpost_document`](Self::reverse_and_unpost_document) to
    /// cancel its effect as well.
    #[instrument(skip(self), fields(document = %id))]
    pub async fn unpost_document(&self, id: DocumentId) -> Result<Option<JournalEntryId>, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut document = tx.lock_document(id).await?;
        ensure_unsettled(&document)?;

        let previous = document.unpost();
        tx.save_document(&document).await?;
        tx.commit().await?;

        info!(previous = ?previous, "Document unposted");
        Ok(previous)
    }

    /// Reverses a document's entry and clears its posting link in one transaction
    #[instrument(skip(self), fields(document = %id))]
    pub async fn reverse_and_unpost_document(&self, id: DocumentId) -> Result<JournalEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut document = tx.lock_document(id).await?;
        ensure_unsettled(&document)?;

        let posted = document
            .gl_journal
            .ok_or_else(|| LedgerError::validation(format!("document {} is not posted", document.number)))?;
        let reversal = reverse_in(tx.as_mut(), posted).await?;

        document.unpost();
        tx.save_document(&document).await?;
        tx.commit().await?;

        info!(reversal = %reversal.id, "Document reversed and unposted");
        Ok(reversal)
    }
}

fn build_draft(document: &Document, base: core_kernel::Currency, rate: rust_decimal::Decimal) -> JournalDraft {
    let memo = if document.currency == base {
        format!("{} {}", document.kind.as_str(), document.number)
    } else {
        format!(
            "{} {} ({} @ {} {})",
            document.kind.as_str(),
            document.number,
            document.currency,
            rate,
            base
        )
    };

    let mut draft = JournalDraft::new(document.date, base, memo, EntrySource::Document(document.id))
        .scope(document.scope.clone());
    for line in &document.distribution {
        let mut converted = DraftLine::new(line.account_code.clone(), line.side, round2(line.amount * rate))
            .with_segment(line.segment.clone());
        converted.memo = line.memo.clone();
        draft.push(converted);
    }
    draft
}

fn ensure_unsettled(document: &Document) -> Result<(), LedgerError> {
    if document.paid > rust_decimal::Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "document {} has settlements; unpost its payments first",
            document.number
        )));
    }
    Ok(())
}

/// Checks that every account a draft posts to exists and is active
pub(crate) async fn ensure_accounts(
    tx: &mut dyn LedgerTransaction,
    draft: &JournalDraft,
) -> Result<(), LedgerError> {
    let codes: BTreeSet<&str> = draft.lines.iter().map(|l| l.account_code.as_str()).collect();
    for code in codes {
        match tx.account(code).await? {
            Some(account) if account.is_active => {}
            Some(_) => return Err(LedgerError::validation(format!("account {code} is inactive"))),
            None => return Err(LedgerError::UnknownAccount(code.to_string())),
        }
    }
    Ok(())
}

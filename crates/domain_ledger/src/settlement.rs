//! Settlement / Allocation Service
//!
//! Applies a payment against one or more posted documents and books the
//! settlement entry in the base currency.
//!
//! # Valuation
//!
//! Each allocation has two legs. The control leg (AR or AP reduction) is
//! valued at the document's booking rate so it cancels exactly against what
//! was recorded at posting. The cash leg is valued at the payment's
//! settlement rate. The aggregated difference is the payment's FX gain or
//! loss, booked as one extra pair against the control account.
//!
//! Lines, for a received payment:
//!
//! | Account | Debit | Credit |
//! |---|---|---|
//! | Bank | cash total | |
//! | AR (per allocation) | | cash leg |
//! | AR / FX gain | gain | gain |
//! | FX loss / AR | loss | loss |
//!
//! A payment made mirrors this against AP and Bank.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    calculate_fx_gain_loss, resolve_exchange_rate, round2, AllocationId, Currency, DocumentId,
    FxDirection, FxGainLoss, JournalEntryId, PaymentId, RateSource,
};

use crate::account::AccountRole;
use crate::config::LedgerConfig;
use crate::document::{Document, PaymentStatus};
use crate::error::LedgerError;
use crate::journal::{DraftLine, EntrySide, EntrySource, JournalDraft, JournalEntry, Segment};
use crate::payment::{Payment, PaymentDirection, PaymentTarget};
use crate::ports::{LedgerStore, LedgerTransaction};
use crate::posting::ensure_accounts;
use crate::reversal::reverse_in;

/// Result of posting a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub entry: JournalEntry,
    /// `true` when the payment had been posted before this call
    pub already_posted: bool,
    /// Numbers of documents this payment brought to `PAID`
    pub closed_documents: Vec<String>,
    /// Aggregated FX difference; `None` when no conversion applied
    pub fx: Option<FxGainLoss>,
}

/// Valued allocation
#[derive(Debug)]
struct Leg {
    document_number: String,
    control: Decimal,
    cash: Decimal,
}

/// Settles payments against documents
#[derive(Clone)]
pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    rates: Arc<dyn RateSource>,
    config: Arc<LedgerConfig>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn LedgerStore>, rates: Arc<dyn RateSource>, config: Arc<LedgerConfig>) -> Self {
        Self { store, rates, config }
    }

    /// Posts a payment in its own transaction
    ///
    /// # Errors
    ///
    /// - `Validation` for non-positive amounts, over-allocation, unposted
    ///   documents or a direction that does not match the document kind
    /// - `MissingAccount` for unmapped Bank/AR/AP roles, or FX roles under `strict_fx`
    /// - `Fx(RateNotFound)` when a settlement or allocation rate cannot be resolved
    #[instrument(skip(self), fields(payment = %id))]
    pub async fn post_payment(&self, id: PaymentId) -> Result<SettlementOutcome, LedgerError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.settle_in(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Posts a payment inside an open transaction
    pub async fn settle_in(
        &self,
        tx: &mut dyn LedgerTransaction,
        id: PaymentId,
    ) -> Result<SettlementOutcome, LedgerError> {
        let mut payment = tx.lock_payment(id).await?;

        if let Some(existing) = payment.gl_journal {
            debug!(entry = %existing, "Payment already posted");
            let entry = tx
                .journal_entry(existing)
                .await?
                .ok_or_else(|| LedgerError::not_found("JournalEntry", existing))?;
            return Ok(SettlementOutcome {
                entry,
                already_posted: true,
                closed_documents: Vec::new(),
                fx: None,
            });
        }

        // Resolved once; the target shape is not consulted again
        let allocations = payment.allocations();
        validate_amounts(&payment, &allocations)?;

        let base = self.config.base_currency;
        let settlement_rate = self.settlement_rate(&mut payment).await?;

        let mut documents = lock_documents(tx, &payment).await?;

        let control_role = payment.direction.settles().control_role();
        let control_account = self.config.account_for(control_role)?.to_string();
        let bank_account = match &payment.bank_account_code {
            Some(code) => code.clone(),
            None => self.config.account_for(AccountRole::Bank)?.to_string(),
        };

        let mut legs = Vec::with_capacity(allocations.len());
        let mut applied: HashMap<DocumentId, Decimal> = HashMap::new();
        let mut captured: Vec<(AllocationId, Decimal)> = Vec::new();
        let mut difference = Decimal::ZERO;

        for allocation in &allocations {
            let document = documents
                .get(&allocation.document_id)
                .ok_or_else(|| LedgerError::not_found("Document", allocation.document_id))?;

            let invoice_rate = match allocation.invoice_exchange_rate {
                Some(rate) if rate > Decimal::ZERO => rate,
                Some(rate) => {
                    return Err(LedgerError::validation(format!(
                        "invalid invoice rate {rate} on allocation {}",
                        allocation.id
                    )))
                }
                None => {
                    let rate = self.resolve(payment.currency, document.currency, &payment).await?;
                    if matches!(payment.target, PaymentTarget::MultiAllocation(_)) {
                        captured.push((allocation.id, rate));
                    }
                    rate
                }
            };

            let amount_in_document = round2(allocation.amount * invoice_rate);
            let total_applied = applied.entry(document.id).or_default();
            *total_applied = round2(*total_applied + amount_in_document);
            if *total_applied > document.balance {
                return Err(LedgerError::validation(format!(
                    "allocation of {} {} exceeds outstanding balance {} of {}",
                    total_applied, document.currency, document.balance, document.number
                )));
            }

            let booking_rate = document.booking_rate();
            let leg_fx = calculate_fx_gain_loss(
                amount_in_document,
                booking_rate,
                allocation.amount,
                settlement_rate,
            );
            let signed = match leg_fx.direction {
                FxDirection::Gain => leg_fx.amount,
                FxDirection::Loss => -leg_fx.amount,
            };
            // Paying more base currency than booked is a loss on the AP side
            difference += match payment.direction {
                PaymentDirection::Received => signed,
                PaymentDirection::Made => -signed,
            };

            legs.push(Leg {
                document_number: document.number.clone(),
                control: round2(amount_in_document * booking_rate),
                cash: round2(allocation.amount * settlement_rate),
            });
        }

        let remainder = round2(payment.amount - payment.allocated_total());
        let remainder_cash = round2(remainder * settlement_rate);

        let fx = FxGainLoss::from_difference(round2(difference));
        let fx_account = self.fx_account(&fx)?;

        let draft = build_draft(
            &payment,
            base,
            settlement_rate,
            &bank_account,
            &control_account,
            &legs,
            remainder_cash,
            fx_account.as_deref().map(|account| (account, &fx)),
        );
        ensure_accounts(tx, &draft).await?;
        let entry = draft.post()?;
        tx.insert_journal_entry(&entry).await?;

        payment.capture_invoice_rates(&captured);
        payment.gl_journal = Some(entry.id);
        payment.posted_at = Some(Utc::now());
        tx.save_payment(&payment).await?;

        let mut closed_documents = Vec::new();
        for document in documents.values_mut() {
            let before = document.payment_status;
            self.recompute(tx, document).await?;
            tx.save_document(document).await?;
            if document.payment_status == PaymentStatus::Paid && before != PaymentStatus::Paid {
                closed_documents.push(document.number.clone());
            }
        }

        info!(
            entry = %entry.id,
            number = %payment.number,
            amount = %payment.amount,
            fx_amount = %fx.amount,
            fx_direction = ?fx.direction,
            closed = ?closed_documents,
            "Payment settled"
        );

        let converted = payment.currency != base || legs.iter().any(|l| l.control != l.cash);
        Ok(SettlementOutcome {
            entry,
            already_posted: false,
            closed_documents,
            fx: converted.then_some(fx),
        })
    }

    /// Clears a payment's posting link and recomputes the documents it settled
    ///
    /// The settlement entry stays in the ledger.
    #[instrument(skip(self), fields(payment = %id))]
    pub async fn unpost_payment(&self, id: PaymentId) -> Result<Option<JournalEntryId>, LedgerError> {
        let mut tx = self.store.begin().await?;
        let previous = self.unpost_in(tx.as_mut(), id, false).await?.0;
        tx.commit().await?;
        Ok(previous)
    }

    /// Reverses a payment's settlement entry and un-posts it in one transaction
    #[instrument(skip(self), fields(payment = %id))]
    pub async fn reverse_and_unpost_payment(&self, id: PaymentId) -> Result<JournalEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        let (_, reversal) = self.unpost_in(tx.as_mut(), id, true).await?;
        let reversal = reversal.ok_or_else(|| LedgerError::validation(format!("payment {id} is not posted")))?;
        tx.commit().await?;
        Ok(reversal)
    }

    async fn unpost_in(
        &self,
        tx: &mut dyn LedgerTransaction,
        id: PaymentId,
        reverse: bool,
    ) -> Result<(Option<JournalEntryId>, Option<JournalEntry>), LedgerError> {
        let mut payment = tx.lock_payment(id).await?;
        let Some(posted) = payment.gl_journal else {
            return Ok((None, None));
        };

        let mut documents = lock_documents(tx, &payment).await?;

        let reversal = if reverse {
            Some(reverse_in(tx, posted).await?)
        } else {
            None
        };

        payment.unpost();
        tx.save_payment(&payment).await?;

        for document in documents.values_mut() {
            self.recompute(tx, document).await?;
            tx.save_document(document).await?;
        }

        info!(previous = %posted, reversed = reverse, "Payment unposted");
        Ok((Some(posted), reversal))
    }

    /// Settlement rate of the payment, resolved and recorded when absent
    async fn settlement_rate(&self, payment: &mut Payment) -> Result<Decimal, LedgerError> {
        let base = self.config.base_currency;
        if payment.currency == base {
            return Ok(Decimal::ONE);
        }
        match payment.payment_fx_rate {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            Some(rate) => Err(LedgerError::validation(format!(
                "invalid payment rate {rate} on {}",
                payment.number
            ))),
            None => {
                let rate = self.resolve(payment.currency, base, payment).await?;
                payment.record_resolved_rate(rate);
                Ok(rate)
            }
        }
    }

    async fn resolve(&self, from: Currency, to: Currency, payment: &Payment) -> Result<Decimal, LedgerError> {
        Ok(resolve_exchange_rate(self.rates.as_ref(), from, to, payment.date, self.config.rate_type).await?)
    }

    /// Account of the FX pair, if one is to be booked
    fn fx_account(&self, fx: &FxGainLoss) -> Result<Option<String>, LedgerError> {
        if fx.is_zero() {
            return Ok(None);
        }
        let role = match fx.direction {
            FxDirection::Gain => AccountRole::FxGain,
            FxDirection::Loss => AccountRole::FxLoss,
        };
        match self.config.optional_account(role) {
            Some(code) => Ok(Some(code.to_string())),
            None if self.config.strict_fx => Err(LedgerError::MissingAccount(role)),
            None => {
                warn!(%role, amount = %fx.amount, "FX account not configured; difference left on control account");
                Ok(None)
            }
        }
    }

    /// Recomputes totals, paid amount, balance and status from posted allocations
    async fn recompute(&self, tx: &mut dyn LedgerTransaction, document: &mut Document) -> Result<(), LedgerError> {
        let settled = tx.settled_allocations(document.id).await?;
        let mut paid = Decimal::ZERO;
        for item in &settled {
            let rate = match item.allocation.invoice_exchange_rate {
                Some(rate) => rate,
                None => {
                    resolve_exchange_rate(
                        self.rates.as_ref(),
                        item.payment_currency,
                        document.currency,
                        item.payment_date,
                        self.config.rate_type,
                    )
                    .await?
                }
            };
            paid += round2(item.allocation.amount * rate);
        }
        document.apply_settlement(paid);
        debug!(document = %document.number, paid = %document.paid, balance = %document.balance, status = %document.payment_status, "Document settlement recomputed");
        Ok(())
    }
}

fn validate_amounts(payment: &Payment, allocations: &[crate::payment::Allocation]) -> Result<(), LedgerError> {
    if payment.amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "payment {} amount must be positive",
            payment.number
        )));
    }
    if let Some(allocation) = allocations.iter().find(|a| a.amount <= Decimal::ZERO) {
        return Err(LedgerError::validation(format!(
            "allocation {} amount must be positive",
            allocation.id
        )));
    }
    let allocated = payment.allocated_total();
    if allocated > round2(payment.amount) {
        return Err(LedgerError::validation(format!(
            "allocations {} exceed payment amount {} of {}",
            allocated, payment.amount, payment.number
        )));
    }
    Ok(())
}

/// Locks every allocated document in ascending id order
async fn lock_documents(
    tx: &mut dyn LedgerTransaction,
    payment: &Payment,
) -> Result<BTreeMap<DocumentId, Document>, LedgerError> {
    let mut ids: Vec<DocumentId> = payment.allocations().iter().map(|a| a.document_id).collect();
    ids.sort();
    ids.dedup();

    let expected = payment.direction.settles();
    let mut documents = BTreeMap::new();
    for id in ids {
        let document = tx.lock_document(id).await?;
        if !document.is_posted() {
            return Err(LedgerError::validation(format!(
                "document {} is not posted",
                document.number
            )));
        }
        if document.kind != expected {
            return Err(LedgerError::validation(format!(
                "{} payment cannot settle {} {}",
                payment.direction.as_str(),
                document.kind.as_str(),
                document.number
            )));
        }
        documents.insert(id, document);
    }
    Ok(documents)
}

#[allow(clippy::too_many_arguments)]
fn build_draft(
    payment: &Payment,
    base: Currency,
    settlement_rate: Decimal,
    bank_account: &str,
    control_account: &str,
    legs: &[Leg],
    remainder_cash: Decimal,
    fx: Option<(&str, &FxGainLoss)>,
) -> JournalDraft {
    let memo = if payment.currency == base {
        format!("Payment {} {}", payment.direction.as_str(), payment.number)
    } else {
        format!(
            "Payment {} {} ({} @ {} {})",
            payment.direction.as_str(),
            payment.number,
            payment.currency,
            settlement_rate,
            base
        )
    };
    let mut draft = JournalDraft::new(payment.date, base, memo, EntrySource::Payment(payment.id))
        .scope(payment.scope.clone());

    let (bank_side, control_side) = match payment.direction {
        PaymentDirection::Received => (EntrySide::Debit, EntrySide::Credit),
        PaymentDirection::Made => (EntrySide::Credit, EntrySide::Debit),
    };

    let cash_total: Decimal = legs.iter().map(|l| l.cash).sum::<Decimal>() + remainder_cash;
    draft.push(DraftLine::new(bank_account, bank_side, cash_total).with_memo(payment.number.clone()));

    for leg in legs {
        draft.push(
            DraftLine::new(control_account, control_side, leg.cash)
                .with_segment(Segment::new().with("document", leg.document_number.clone()))
                .with_memo(leg.document_number.clone()),
        );
    }

    if remainder_cash > Decimal::ZERO {
        draft.push(DraftLine::new(control_account, control_side, remainder_cash).with_memo("Unapplied"));
    }

    if let Some((fx_account, fx)) = fx {
        let (debit_account, credit_account) = match fx.direction {
            FxDirection::Gain => (control_account, fx_account),
            FxDirection::Loss => (fx_account, control_account),
        };
        draft.push(DraftLine::new(debit_account, EntrySide::Debit, fx.amount).with_memo("FX difference"));
        draft.push(DraftLine::new(credit_account, EntrySide::Credit, fx.amount).with_memo("FX difference"));
    }

    draft
}

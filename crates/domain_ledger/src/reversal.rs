//! Reversal Service
//!
//! A reversal is a new entry dated today whose lines mirror the source entry
//! with debit and credit swapped. The source entry is never modified, and the
//! owning document or payment is not un-linked here.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use core_kernel::JournalEntryId;

use crate::error::LedgerError;
use crate::journal::{JournalDraft, JournalEntry};
use crate::ports::{LedgerStore, LedgerTransaction};

#[derive(Clone)]
pub struct ReversalService {
    store: Arc<dyn LedgerStore>,
}

impl ReversalService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Reverses a posted entry in its own transaction
    #[instrument(skip(self), fields(entry = %id))]
    pub async fn reverse_journal(&self, id: JournalEntryId) -> Result<JournalEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        let reversal = reverse_in(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(reversal)
    }
}

/// Inserts the mirror of entry `id` inside an open transaction
pub async fn reverse_in(
    tx: &mut dyn LedgerTransaction,
    id: JournalEntryId,
) -> Result<JournalEntry, LedgerError> {
    let entry = tx
        .journal_entry(id)
        .await?
        .ok_or_else(|| LedgerError::not_found("JournalEntry", id))?;
    if !entry.posted {
        return Err(LedgerError::validation(format!("journal entry {id} is not posted")));
    }

    let reversal = JournalDraft::mirror_of(&entry, Utc::now().date_naive()).post()?;
    tx.insert_journal_entry(&reversal).await?;

    info!(source = %id, reversal = %reversal.id, total = %reversal.total_debit(), "Journal entry reversed");
    Ok(reversal)
}

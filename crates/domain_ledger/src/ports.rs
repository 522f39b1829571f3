//! Ledger Persistence Ports
//!
//! This module defines the port interfaces the ledger services need from
//! their persistence layer. Every multi-step mutation runs inside one
//! [`LedgerTransaction`]: either all of its writes commit or none do.
//!
//! # Architecture
//!
//! - **`LedgerStore`**: opens transactions and serves the read paths used by
//!   reports and callers
//! - **`LedgerTransaction`**: row locks, staged writes and commit
//!
//! Two adapters implement these traits:
//!
//! - **In-memory adapter** ([`InMemoryLedgerStore`](crate::memory::InMemoryLedgerStore))
//!   for tests and embedded use
//! - **PostgreSQL adapter** (`infra_db::PgLedgerStore`)
//!
//! # Locking
//!
//! `lock_*` methods take an exclusive, blocking lock on the row that is held
//! until the transaction commits or is dropped. Callers that lock several
//! documents lock them in ascending id order.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let document = tx.lock_document(id).await?;
//! // ... build and insert the entry, update the document ...
//! tx.save_document(&document).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::{
    DocumentId, DomainPort, HealthCheckable, JournalEntryId, PaymentId, PortError, TaxFilingId,
};

use crate::account::{Account, AccountClass};
use crate::document::{Document, DocumentKind};
use crate::journal::{JournalEntry, Segment};
use crate::payment::{Payment, SettledAllocation};
use crate::tax::{CorporateTaxFiling, TaxPeriodKey};

/// Filter over posted journal lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineQuery {
    /// Inclusive lower bound on the entry date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date
    pub to: Option<NaiveDate>,
    /// Only entries with this scope; all scopes when `None`
    pub scope: Option<String>,
}

impl LineQuery {
    /// Lines dated within `[from, to]`
    pub fn between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from,
            to,
            scope: None,
        }
    }

    pub fn in_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Whether an entry with this date and scope matches
    pub fn matches(&self, date: NaiveDate, scope: Option<&str>) -> bool {
        if self.from.is_some_and(|from| date < from) {
            return false;
        }
        if self.to.is_some_and(|to| date > to) {
            return false;
        }
        match &self.scope {
            Some(wanted) => scope == Some(wanted.as_str()),
            None => true,
        }
    }
}

/// A line of a posted entry, flattened with its entry and account data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedLine {
    pub entry_id: JournalEntryId,
    pub entry_date: NaiveDate,
    pub scope: Option<String>,
    pub account_code: String,
    /// Class of the account; `None` when the code is not in the chart
    pub account_class: Option<AccountClass>,
    pub segment: Segment,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Read side of the ledger and transaction factory
#[async_trait]
pub trait LedgerStore: DomainPort + HealthCheckable {
    /// Opens a unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, PortError>;

    /// Retrieves a journal entry with its lines
    async fn journal_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError>;

    /// All journal entries produced for a source record, oldest first
    async fn entries_for_source(&self, source: uuid::Uuid) -> Result<Vec<JournalEntry>, PortError>;

    /// Lines of posted entries matching the query
    async fn posted_lines(&self, query: &LineQuery) -> Result<Vec<PostedLine>, PortError>;

    /// The chart of accounts
    async fn accounts(&self) -> Result<Vec<Account>, PortError>;

    /// Resolves an account code
    async fn account_by_code(&self, code: &str) -> Result<Option<Account>, PortError>;

    /// Retrieves a document without locking it
    async fn document(&self, id: DocumentId) -> Result<Option<Document>, PortError>;

    /// Posted documents with an outstanding balance
    async fn open_documents(&self, kind: Option<DocumentKind>) -> Result<Vec<Document>, PortError>;

    /// Retrieves a payment without locking it
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, PortError>;

    /// Retrieves a tax filing without locking it
    async fn tax_filing(&self, id: TaxFilingId) -> Result<Option<CorporateTaxFiling>, PortError>;
}

/// A unit of work against the ledger
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls back
/// every staged write and releases its locks.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Locks a document row, waiting for concurrent holders
    ///
    /// # Returns
    ///
    /// The current document, or `PortError::NotFound`
    async fn lock_document(&mut self, id: DocumentId) -> Result<Document, PortError>;

    /// Writes every ledger-owned field of a locked document
    async fn save_document(&mut self, document: &Document) -> Result<(), PortError>;

    /// Locks a payment row, waiting for concurrent holders
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Payment, PortError>;

    /// Writes the posting fields and captured allocation rates of a locked payment
    async fn save_payment(&mut self, payment: &Payment) -> Result<(), PortError>;

    /// Allocations of posted payments against a document
    async fn settled_allocations(
        &mut self,
        document: DocumentId,
    ) -> Result<Vec<SettledAllocation>, PortError>;

    /// Resolves an account code
    async fn account(&mut self, code: &str) -> Result<Option<Account>, PortError>;

    /// Retrieves a journal entry, including ones inserted in this transaction
    async fn journal_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError>;

    /// Appends a posted journal entry with its lines
    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError>;

    /// Lines of posted entries matching the query
    async fn posted_lines(&mut self, query: &LineQuery) -> Result<Vec<PostedLine>, PortError>;

    /// Locks a tax period, whether or not a filing exists for it yet
    async fn lock_tax_filing(
        &mut self,
        key: &TaxPeriodKey,
    ) -> Result<Option<CorporateTaxFiling>, PortError>;

    /// Locks the period of an existing filing
    async fn lock_tax_filing_by_id(&mut self, id: TaxFilingId) -> Result<CorporateTaxFiling, PortError>;

    /// Inserts or updates a filing; the period must already be locked
    async fn save_tax_filing(&mut self, filing: &CorporateTaxFiling) -> Result<(), PortError>;

    /// Makes every staged write visible and releases the locks
    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}

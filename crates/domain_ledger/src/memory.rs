//! In-memory ledger store
//!
//! Row locks are per-key async mutexes held by the transaction until it
//! commits or is dropped; a key's entry is removed from the lock table once
//! nobody holds or waits on it. Writes are staged on the transaction and applied to
//! the shared state at commit, before the row locks are released, so a
//! dropped transaction leaves no trace.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use core_kernel::{
    DocumentId, DomainPort, HealthCheckResult, HealthCheckable, JournalEntryId, PaymentId,
    PortError, TaxFilingId,
};

use crate::account::{Account, StandardChartOfAccounts};
use crate::document::{Document, DocumentKind};
use crate::journal::JournalEntry;
use crate::payment::{Payment, SettledAllocation};
use crate::ports::{LedgerStore, LedgerTransaction, LineQuery, PostedLine};
use crate::tax::{CorporateTaxFiling, TaxPeriodKey};

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<String, Account>,
    documents: HashMap<DocumentId, Document>,
    payments: HashMap<PaymentId, Payment>,
    /// Append-only, in insertion order
    entries: Vec<JournalEntry>,
    filings: HashMap<TaxFilingId, CorporateTaxFiling>,
}

impl LedgerState {
    fn posted_lines(&self, entries: &[JournalEntry], query: &LineQuery) -> Vec<PostedLine> {
        self.entries
            .iter()
            .chain(entries)
            .filter(|e| e.posted && query.matches(e.date, e.scope.as_deref()))
            .flat_map(|entry| {
                entry.lines.iter().map(move |line| PostedLine {
                    entry_id: entry.id,
                    entry_date: entry.date,
                    scope: entry.scope.clone(),
                    account_code: line.account_code.clone(),
                    account_class: self.accounts.get(&line.account_code).map(|a| a.class),
                    segment: line.segment.clone(),
                    debit: line.debit,
                    credit: line.credit,
                })
            })
            .collect()
    }
}

/// Never held across an await
type LockTable = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Ledger store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    locks: LockTable,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the standard chart of accounts
    pub async fn with_standard_chart() -> Self {
        let store = Self::new();
        for account in StandardChartOfAccounts::create_standard_accounts() {
            store.put_account(account).await;
        }
        store
    }

    pub async fn put_account(&self, account: Account) {
        self.state.write().await.accounts.insert(account.code.clone(), account);
    }

    /// Inserts or replaces a document, as the document module would
    pub async fn put_document(&self, document: Document) {
        self.state.write().await.documents.insert(document.id, document);
    }

    /// Inserts or replaces a payment, as the payment module would
    pub async fn put_payment(&self, payment: Payment) {
        self.state.write().await.payments.insert(payment.id, payment);
    }

    /// Every journal entry, oldest first
    pub async fn journal_entries(&self) -> Vec<JournalEntry> {
        self.state.read().await.entries.clone()
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-ledger")
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, PortError> {
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            locks: Arc::clone(&self.locks),
            guards: HashMap::new(),
            documents: HashMap::new(),
            payments: HashMap::new(),
            entries: Vec::new(),
            filings: HashMap::new(),
        }))
    }

    async fn journal_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        let state = self.state.read().await;
        Ok(state.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn entries_for_source(&self, source: uuid::Uuid) -> Result<Vec<JournalEntry>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.source.reference() == source)
            .cloned()
            .collect())
    }

    async fn posted_lines(&self, query: &LineQuery) -> Result<Vec<PostedLine>, PortError> {
        let state = self.state.read().await;
        Ok(state.posted_lines(&[], query))
    }

    async fn accounts(&self) -> Result<Vec<Account>, PortError> {
        Ok(self.state.read().await.accounts.values().cloned().collect())
    }

    async fn account_by_code(&self, code: &str) -> Result<Option<Account>, PortError> {
        Ok(self.state.read().await.accounts.get(code).cloned())
    }

    async fn document(&self, id: DocumentId) -> Result<Option<Document>, PortError> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn open_documents(&self, kind: Option<DocumentKind>) -> Result<Vec<Document>, PortError> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.is_posted() && d.balance > rust_decimal::Decimal::ZERO)
            .filter(|d| kind.map_or(true, |k| d.kind == k))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.number.cmp(&b.number)));
        Ok(documents)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn tax_filing(&self, id: TaxFilingId) -> Result<Option<CorporateTaxFiling>, PortError> {
        Ok(self.state.read().await.filings.get(&id).cloned())
    }
}

/// Transaction over an [`InMemoryLedgerStore`]
pub struct InMemoryTransaction {
    state: Arc<RwLock<LedgerState>>,
    locks: LockTable,
    guards: HashMap<String, OwnedMutexGuard<()>>,
    documents: HashMap<DocumentId, Document>,
    payments: HashMap<PaymentId, Payment>,
    entries: Vec<JournalEntry>,
    filings: HashMap<TaxFilingId, CorporateTaxFiling>,
}

impl InMemoryTransaction {
    /// Acquires the row lock for `key`; re-entrant within the transaction
    async fn acquire(&mut self, key: String) {
        if self.guards.contains_key(&key) {
            return;
        }
        let row = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let guard = row.lock_owned().await;
        debug!(%key, "Row lock acquired");
        self.guards.insert(key, guard);
    }

    /// Releases every row lock and prunes entries nobody else references
    fn release(&mut self) {
        if self.guards.is_empty() {
            return;
        }
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, guard) in self.guards.drain() {
            drop(guard);
            if table.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
                table.remove(&key);
            }
        }
    }

    fn ensure_locked(&self, key: &str) -> Result<(), PortError> {
        if self.guards.contains_key(key) {
            Ok(())
        } else {
            Err(PortError::conflict(format!("{key} is not locked by this transaction")))
        }
    }

    fn document_key(id: DocumentId) -> String {
        format!("document:{id}")
    }

    fn payment_key(id: PaymentId) -> String {
        format!("payment:{id}")
    }

    async fn find_filing(&self, key: &TaxPeriodKey) -> Option<CorporateTaxFiling> {
        if let Some(staged) = self.filings.values().find(|f| &f.key == key) {
            return Some(staged.clone());
        }
        let state = self.state.read().await;
        state.filings.values().find(|f| &f.key == key).cloned()
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_document(&mut self, id: DocumentId) -> Result<Document, PortError> {
        self.acquire(Self::document_key(id)).await;
        if let Some(staged) = self.documents.get(&id) {
            return Ok(staged.clone());
        }
        let state = self.state.read().await;
        state
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Document", id))
    }

    async fn save_document(&mut self, document: &Document) -> Result<(), PortError> {
        self.ensure_locked(&Self::document_key(document.id))?;
        self.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Payment, PortError> {
        self.acquire(Self::payment_key(id)).await;
        if let Some(staged) = self.payments.get(&id) {
            return Ok(staged.clone());
        }
        let state = self.state.read().await;
        state
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", id))
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        self.ensure_locked(&Self::payment_key(payment.id))?;
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn settled_allocations(
        &mut self,
        document: DocumentId,
    ) -> Result<Vec<SettledAllocation>, PortError> {
        let state = self.state.read().await;
        let mut payments: HashMap<PaymentId, &Payment> = state.payments.iter().map(|(id, p)| (*id, p)).collect();
        for (id, staged) in &self.payments {
            payments.insert(*id, staged);
        }

        let mut settled: Vec<SettledAllocation> = payments
            .values()
            .filter(|p| p.is_posted())
            .flat_map(|payment| {
                payment
                    .allocations()
                    .into_iter()
                    .filter(|a| a.document_id == document)
                    .map(|allocation| SettledAllocation {
                        payment_id: payment.id,
                        payment_currency: payment.currency,
                        payment_date: payment.date,
                        allocation,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        settled.sort_by(|a, b| a.payment_date.cmp(&b.payment_date).then(a.payment_id.cmp(&b.payment_id)));
        Ok(settled)
    }

    async fn account(&mut self, code: &str) -> Result<Option<Account>, PortError> {
        Ok(self.state.read().await.accounts.get(code).cloned())
    }

    async fn journal_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        if let Some(staged) = self.entries.iter().find(|e| e.id == id) {
            return Ok(Some(staged.clone()));
        }
        let state = self.state.read().await;
        Ok(state.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        let duplicate = self.entries.iter().any(|e| e.id == entry.id)
            || self.state.read().await.entries.iter().any(|e| e.id == entry.id);
        if duplicate {
            return Err(PortError::conflict(format!("journal entry {} already exists", entry.id)));
        }
        self.entries.push(entry.clone());
        Ok(())
    }

    async fn posted_lines(&mut self, query: &LineQuery) -> Result<Vec<PostedLine>, PortError> {
        let state = self.state.read().await;
        Ok(state.posted_lines(&self.entries, query))
    }

    async fn lock_tax_filing(
        &mut self,
        key: &TaxPeriodKey,
    ) -> Result<Option<CorporateTaxFiling>, PortError> {
        self.acquire(key.lock_key()).await;
        Ok(self.find_filing(key).await)
    }

    async fn lock_tax_filing_by_id(&mut self, id: TaxFilingId) -> Result<CorporateTaxFiling, PortError> {
        let key = match self.filings.get(&id) {
            Some(staged) => staged.key.clone(),
            None => {
                let state = self.state.read().await;
                state
                    .filings
                    .get(&id)
                    .map(|f| f.key.clone())
                    .ok_or_else(|| PortError::not_found("CorporateTaxFiling", id))?
            }
        };

        self.acquire(key.lock_key()).await;
        self.find_filing(&key)
            .await
            .filter(|f| f.id == id)
            .ok_or_else(|| PortError::not_found("CorporateTaxFiling", id))
    }

    async fn save_tax_filing(&mut self, filing: &CorporateTaxFiling) -> Result<(), PortError> {
        self.ensure_locked(&filing.key.lock_key())?;
        if let Some(existing) = self.find_filing(&filing.key).await {
            if existing.id != filing.id {
                return Err(PortError::conflict(format!(
                    "a filing already exists for {}",
                    filing.key
                )));
            }
        }
        self.filings.insert(filing.id, filing.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), PortError> {
        {
            let mut state = self.state.write().await;
            state.documents.extend(std::mem::take(&mut self.documents));
            state.payments.extend(std::mem::take(&mut self.payments));
            state.entries.append(&mut self.entries);
            state.filings.extend(std::mem::take(&mut self.filings));
        }
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.release();
    }
}

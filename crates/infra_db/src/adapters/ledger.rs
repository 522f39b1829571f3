//! PostgreSQL Ledger Store
//!
//! This module provides the database adapter for the ledger ports,
//! implementing `LedgerStore` and `LedgerTransaction` over the repositories.
//!
//! # Overview
//!
//! Each [`PgLedgerTransaction`] owns one SQL transaction for its whole
//! lifetime. Locks map onto PostgreSQL as follows:
//!
//! - documents and payments: `SELECT ... FOR UPDATE` on the row
//! - tax periods: `pg_advisory_xact_lock` on a hash of the period key, so a
//!   period can be locked before its filing row exists
//!
//! Both kinds are released when the transaction commits or rolls back.
//! Dropping a `PgLedgerTransaction` without committing rolls it back.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PgLedgerStore};
//! use domain_ledger::{GeneralLedger, LedgerStore};
//! use std::sync::Arc;
//!
//! let pool = create_pool(DatabaseConfig::new(url).run_migrations(true)).await?;
//! let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool));
//! let ledger = GeneralLedger::new(store, rates, config);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, DocumentId, DomainPort, HealthCheckResult, HealthCheckable, JournalEntryId,
    PaymentId, PortError, TaxFilingId,
};
use domain_ledger::{
    Account, CorporateTaxFiling, Document, DocumentKind, JournalEntry, LedgerStore,
    LedgerTransaction, LineQuery, Payment, PostedLine, SettledAllocation,
    StandardChartOfAccounts, TaxPeriodKey,
};

use crate::error::DatabaseError;
use crate::repositories::{
    AccountRepository, DocumentRepository, FilingRepository, JournalRepository, PaymentRepository,
};

const ADAPTER_ID: &str = "postgres-ledger-store";

/// PostgreSQL-backed implementation of [`LedgerStore`]
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, PortError> {
        Ok(self.pool.acquire().await.map_err(DatabaseError::from)?)
    }

    /// Inserts or updates a chart of accounts entry
    pub async fn put_account(&self, account: &Account) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        AccountRepository::upsert(&mut conn, account).await
    }

    /// Loads the standard chart of accounts
    ///
    /// Parents are written before their children, so the order of
    /// `create_standard_accounts` is kept.
    #[instrument(skip(self))]
    pub async fn seed_standard_chart(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let accounts = StandardChartOfAccounts::create_standard_accounts();
        for account in &accounts {
            AccountRepository::upsert(&mut tx, account).await?;
        }
        tx.commit().await?;
        info!(accounts = accounts.len(), "Standard chart of accounts loaded");
        Ok(())
    }

    /// Inserts or replaces a document on behalf of the document module
    pub async fn put_document(&self, document: &Document) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        DocumentRepository::upsert(&mut conn, document).await
    }

    /// Inserts or replaces a payment on behalf of the payment module
    pub async fn put_payment(&self, payment: &Payment) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        PaymentRepository::upsert(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl DomainPort for PgLedgerStore {}

#[async_trait]
impl HealthCheckable for PgLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, PortError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        Ok(Box::new(PgLedgerTransaction {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn journal_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        let mut conn = self.connection().await?;
        Ok(JournalRepository::find(&mut conn, id).await?)
    }

    async fn entries_for_source(&self, source: Uuid) -> Result<Vec<JournalEntry>, PortError> {
        let mut conn = self.connection().await?;
        Ok(JournalRepository::for_source(&mut conn, source).await?)
    }

    async fn posted_lines(&self, query: &LineQuery) -> Result<Vec<PostedLine>, PortError> {
        let mut conn = self.connection().await?;
        Ok(JournalRepository::posted_lines(&mut conn, query).await?)
    }

    async fn accounts(&self) -> Result<Vec<Account>, PortError> {
        let mut conn = self.connection().await?;
        Ok(AccountRepository::list(&mut conn).await?)
    }

    async fn account_by_code(&self, code: &str) -> Result<Option<Account>, PortError> {
        let mut conn = self.connection().await?;
        Ok(AccountRepository::by_code(&mut conn, code).await?)
    }

    async fn document(&self, id: DocumentId) -> Result<Option<Document>, PortError> {
        let mut conn = self.connection().await?;
        Ok(DocumentRepository::find(&mut conn, id).await?)
    }

    async fn open_documents(&self, kind: Option<DocumentKind>) -> Result<Vec<Document>, PortError> {
        let mut conn = self.connection().await?;
        Ok(DocumentRepository::open(&mut conn, kind).await?)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        let mut conn = self.connection().await?;
        Ok(PaymentRepository::find(&mut conn, id).await?)
    }

    async fn tax_filing(&self, id: TaxFilingId) -> Result<Option<CorporateTaxFiling>, PortError> {
        let mut conn = self.connection().await?;
        Ok(FilingRepository::find(&mut conn, id).await?)
    }
}

/// Unit of work over one PostgreSQL transaction
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
    /// Keys locked by this transaction; saves are refused for anything else
    locked: HashSet<String>,
}

impl PgLedgerTransaction {
    fn ensure_locked(&self, key: &str) -> Result<(), PortError> {
        if self.locked.contains(key) {
            Ok(())
        } else {
            Err(PortError::conflict(format!("{key} is not locked by this transaction")))
        }
    }

    /// Blocks until the transaction-scoped advisory lock for `key` is held
    async fn advisory_lock(&mut self, key: &str) -> Result<(), PortError> {
        if self.locked.contains(key) {
            return Ok(());
        }
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        debug!(%key, "Advisory lock acquired");
        self.locked.insert(key.to_string());
        Ok(())
    }

    fn document_key(id: DocumentId) -> String {
        format!("document:{id}")
    }

    fn payment_key(id: PaymentId) -> String {
        format!("payment:{id}")
    }
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_document(&mut self, id: DocumentId) -> Result<Document, PortError> {
        let document = DocumentRepository::lock(&mut self.tx, id)
            .await?
            .ok_or_else(|| PortError::not_found("Document", id))?;
        self.locked.insert(Self::document_key(id));
        Ok(document)
    }

    async fn save_document(&mut self, document: &Document) -> Result<(), PortError> {
        self.ensure_locked(&Self::document_key(document.id))?;
        Ok(DocumentRepository::upsert(&mut self.tx, document).await?)
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Payment, PortError> {
        let payment = PaymentRepository::lock(&mut self.tx, id)
            .await?
            .ok_or_else(|| PortError::not_found("Payment", id))?;
        self.locked.insert(Self::payment_key(id));
        Ok(payment)
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        self.ensure_locked(&Self::payment_key(payment.id))?;
        Ok(PaymentRepository::upsert(&mut self.tx, payment).await?)
    }

    async fn settled_allocations(
        &mut self,
        document: DocumentId,
    ) -> Result<Vec<SettledAllocation>, PortError> {
        Ok(PaymentRepository::settled_allocations(&mut self.tx, document).await?)
    }

    async fn account(&mut self, code: &str) -> Result<Option<Account>, PortError> {
        Ok(AccountRepository::by_code(&mut self.tx, code).await?)
    }

    async fn journal_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        Ok(JournalRepository::find(&mut self.tx, id).await?)
    }

    #[instrument(skip(self, entry), fields(entry_id = %entry.id, lines = entry.lines.len()))]
    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        Ok(JournalRepository::insert(&mut self.tx, entry).await?)
    }

    async fn posted_lines(&mut self, query: &LineQuery) -> Result<Vec<PostedLine>, PortError> {
        Ok(JournalRepository::posted_lines(&mut self.tx, query).await?)
    }

    async fn lock_tax_filing(
        &mut self,
        key: &TaxPeriodKey,
    ) -> Result<Option<CorporateTaxFiling>, PortError> {
        self.advisory_lock(&key.lock_key()).await?;
        Ok(FilingRepository::find_by_key(&mut self.tx, key).await?)
    }

    async fn lock_tax_filing_by_id(&mut self, id: TaxFilingId) -> Result<CorporateTaxFiling, PortError> {
        let key = FilingRepository::key_of(&mut self.tx, id)
            .await?
            .ok_or_else(|| PortError::not_found("CorporateTaxFiling", id))?;
        self.advisory_lock(&key.lock_key()).await?;
        // Re-read under the lock; the row may have changed while waiting
        FilingRepository::find(&mut self.tx, id)
            .await?
            .ok_or_else(|| PortError::not_found("CorporateTaxFiling", id))
    }

    async fn save_tax_filing(&mut self, filing: &CorporateTaxFiling) -> Result<(), PortError> {
        self.ensure_locked(&filing.key.lock_key())?;
        Ok(FilingRepository::upsert(&mut self.tx, filing).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let locks = self.locked.len();
        self.tx.commit().await.map_err(DatabaseError::from)?;
        debug!(locks, "Ledger transaction committed");
        Ok(())
    }
}

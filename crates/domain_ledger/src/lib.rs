//! General Ledger Domain
//!
//! This crate turns commercial documents and payments into balanced
//! double-entry journal entries in a single base currency:
//!
//! - **Posting**: invoice + GL distribution lines -> one journal entry, idempotently
//! - **Settlement**: payment allocations against posted invoices, with FX gain/loss
//! - **Reversal**: mirror entries; posted entries are never modified
//! - **Corporate tax**: period profit aggregation and the ACCRUED/FILED/REVERSED lifecycle
//! - **Reporting**: trial balance and aging
//!
//! Every mutation runs inside one [`LedgerTransaction`]; concurrent callers
//! are serialized by row locks taken before any idempotency check.

pub mod account;
pub mod error;
pub mod journal;
pub mod document;
pub mod payment;
pub mod tax;
pub mod config;
pub mod ports;
pub mod memory;
pub mod posting;
pub mod settlement;
pub mod reversal;
pub mod corporate_tax;
pub mod reporting;
pub mod ledger;

pub use account::{Account, AccountClass, AccountRole, StandardChartOfAccounts};
pub use error::LedgerError;
pub use journal::{DraftLine, EntrySide, EntrySource, JournalDraft, JournalEntry, JournalLine, Segment};
pub use document::{Document, DocumentKind, GlDistributionLine, LineItem, PaymentStatus};
pub use payment::{Allocation, Payment, PaymentDirection, PaymentTarget, SettledAllocation};
pub use tax::{CorporateTaxFiling, CorporateTaxRule, FilingState, TaxComputation, TaxPeriodKey};
pub use config::{AccountMapping, LedgerConfig};
pub use ports::{LedgerStore, LedgerTransaction, LineQuery, PostedLine};
pub use memory::InMemoryLedgerStore;
pub use posting::{PostingOutcome, PostingService};
pub use settlement::{SettlementOutcome, SettlementService};
pub use reversal::{reverse_in, ReversalService};
pub use corporate_tax::{period_profit, AccrualOutcome, CorporateTaxService};
pub use reporting::{
    AgingBucketTotal, AgingQuery, AgingReport, AgingRow, ReportingService, TrialBalance,
    TrialBalanceRow, DEFAULT_AGING_BUCKETS, TOTAL_ROW,
};
pub use ledger::GeneralLedger;

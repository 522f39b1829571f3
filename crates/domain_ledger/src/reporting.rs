//! Trial balance and receivable/payable aging

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

use core_kernel::{round2, Currency, DocumentId};

use crate::document::{Document, DocumentKind};
use crate::error::LedgerError;
use crate::ports::{LedgerStore, LineQuery};

/// Label of the total row
pub const TOTAL_ROW: &str = "TOTAL";

/// Default aging bucket upper bounds, in days overdue
pub const DEFAULT_AGING_BUCKETS: [u32; 3] = [30, 60, 90];

/// Net position of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_code: String,
    pub name: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Accounts with a non-zero net balance, sorted by code
    pub rows: Vec<TrialBalanceRow>,
    pub total: TrialBalanceRow,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        self.total.debit == self.total.credit
    }

    /// Account rows followed by the total row
    pub fn rows_with_total(&self) -> impl Iterator<Item = &TrialBalanceRow> {
        self.rows.iter().chain(std::iter::once(&self.total))
    }

    pub fn row(&self, account_code: &str) -> Option<&TrialBalanceRow> {
        self.rows.iter().find(|r| r.account_code == account_code)
    }
}

/// Options of an aging report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingQuery {
    /// Reference date; today when absent
    pub as_of: Option<NaiveDate>,
    /// Increasing upper bounds in days; 30/60/90 when absent
    pub buckets: Option<Vec<u32>>,
    /// Only customer or supplier invoices
    pub kind: Option<DocumentKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingRow {
    pub document_id: DocumentId,
    pub number: String,
    pub kind: DocumentKind,
    pub party: Option<String>,
    pub currency: Currency,
    /// Due date, or document date when no due date is set
    pub due_date: NaiveDate,
    /// Negative when not yet due
    pub days_overdue: i64,
    pub balance: Decimal,
    /// Balance at the booking rate
    pub base_balance: Decimal,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingBucketTotal {
    pub label: String,
    pub count: usize,
    /// Sum of base-currency balances
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub rows: Vec<AgingRow>,
    pub buckets: Vec<AgingBucketTotal>,
    pub total: Decimal,
}

impl AgingReport {
    pub fn bucket(&self, label: &str) -> Option<&AgingBucketTotal> {
        self.buckets.iter().find(|b| b.label == label)
    }
}

/// Read-only reports over the ledger
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn LedgerStore>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Net debit or credit per account over posted lines dated within `[from, to]`
    #[instrument(skip(self))]
    pub async fn build_trial_balance(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<TrialBalance, LedgerError> {
        let lines = self.store.posted_lines(&LineQuery::between(from, to)).await?;
        let names: HashMap<String, String> = self
            .store
            .accounts()
            .await?
            .into_iter()
            .map(|a| (a.code, a.name))
            .collect();

        let mut net: BTreeMap<String, Decimal> = BTreeMap::new();
        for line in lines {
            *net.entry(line.account_code).or_default() += line.debit - line.credit;
        }

        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        let mut rows = Vec::new();
        for (code, amount) in net {
            let amount = round2(amount);
            if amount.is_zero() {
                continue;
            }
            let (debit, credit) = if amount > Decimal::ZERO {
                (amount, Decimal::ZERO)
            } else {
                (Decimal::ZERO, -amount)
            };
            total_debit += debit;
            total_credit += credit;
            rows.push(TrialBalanceRow {
                name: names.get(&code).cloned().unwrap_or_else(|| code.clone()),
                account_code: code,
                debit,
                credit,
            });
        }

        Ok(TrialBalance {
            from,
            to,
            rows,
            total: TrialBalanceRow {
                account_code: TOTAL_ROW.to_string(),
                name: TOTAL_ROW.to_string(),
                debit: round2(total_debit),
                credit: round2(total_credit),
            },
        })
    }

    /// Outstanding posted documents grouped by days overdue
    #[instrument(skip(self))]
    pub async fn build_aging_report(&self, query: AgingQuery) -> Result<AgingReport, LedgerError> {
        let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let bounds = match query.buckets {
            Some(bounds) => validate_buckets(bounds)?,
            None => DEFAULT_AGING_BUCKETS.to_vec(),
        };
        let labels = bucket_labels(&bounds);

        let documents = self.store.open_documents(query.kind).await?;
        let mut rows: Vec<AgingRow> = documents.iter().map(|d| aging_row(d, as_of, &bounds, &labels)).collect();
        rows.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue).then_with(|| a.number.cmp(&b.number)));

        let mut buckets: Vec<AgingBucketTotal> = labels
            .iter()
            .map(|label| AgingBucketTotal {
                label: label.clone(),
                count: 0,
                total: Decimal::ZERO,
            })
            .collect();
        for row in &rows {
            if let Some(bucket) = buckets.iter_mut().find(|b| b.label == row.bucket) {
                bucket.count += 1;
                bucket.total = round2(bucket.total + row.base_balance);
            }
        }
        let total = round2(buckets.iter().map(|b| b.total).sum());

        Ok(AgingReport {
            as_of,
            rows,
            buckets,
            total,
        })
    }
}

fn validate_buckets(bounds: Vec<u32>) -> Result<Vec<u32>, LedgerError> {
    if bounds.is_empty() || bounds[0] == 0 || bounds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(LedgerError::validation(format!(
            "aging buckets must be positive and strictly increasing, got {bounds:?}"
        )));
    }
    Ok(bounds)
}

/// "Current", one label per bound, and an open-ended last bucket
fn bucket_labels(bounds: &[u32]) -> Vec<String> {
    let mut labels = vec!["Current".to_string()];
    let mut lower = 1;
    for bound in bounds {
        labels.push(format!("{lower}-{bound}"));
        lower = bound + 1;
    }
    if let Some(last) = bounds.last() {
        labels.push(format!("{last}+"));
    }
    labels
}

fn aging_row(document: &Document, as_of: NaiveDate, bounds: &[u32], labels: &[String]) -> AgingRow {
    let due_date = document.aging_date();
    let days_overdue = (as_of - due_date).num_days();

    let index = if days_overdue <= 0 {
        0
    } else {
        bounds
            .iter()
            .position(|bound| days_overdue <= i64::from(*bound))
            .map_or(bounds.len() + 1, |i| i + 1)
    };

    AgingRow {
        document_id: document.id,
        number: document.number.clone(),
        kind: document.kind,
        party: document.party.clone(),
        currency: document.currency,
        due_date,
        days_overdue,
        balance: document.balance,
        base_balance: round2(document.balance * document.booking_rate()),
        bucket: labels.get(index).cloned().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bucket_labels() {
        assert_eq!(
            bucket_labels(&DEFAULT_AGING_BUCKETS),
            vec!["Current", "1-30", "31-60", "61-90", "90+"]
        );
    }

    #[test]
    fn test_buckets_must_increase() {
        assert!(validate_buckets(vec![30, 30]).is_err());
        assert!(validate_buckets(vec![0, 30]).is_err());
        assert!(validate_buckets(vec![]).is_err());
        assert_eq!(validate_buckets(vec![15, 45]).unwrap(), vec![15, 45]);
    }
}

//! Corporate tax filing repository

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use core_kernel::{JournalEntryId, TaxFilingId};
use domain_ledger::{CorporateTaxFiling, FilingState, TaxComputation, TaxPeriodKey};

use super::parse_column;
use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct FilingRow {
    pub id: Uuid,
    pub lock_key: String,
    pub country: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub scope: Option<String>,
    pub state: String,
    pub profit: Decimal,
    pub taxable_base: Decimal,
    pub tax: Decimal,
    pub accrual_entry: Option<Uuid>,
    pub reversal_entry: Option<Uuid>,
    pub accrued_at: DateTime<Utc>,
    pub filed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl TryFrom<FilingRow> for CorporateTaxFiling {
    type Error = DatabaseError;

    fn try_from(row: FilingRow) -> Result<Self, Self::Error> {
        Ok(CorporateTaxFiling {
            id: TaxFilingId::from_uuid(row.id),
            key: TaxPeriodKey::new(row.country, row.period_start, row.period_end, row.scope),
            state: parse_column::<FilingState>("corporate_tax_filings.state", &row.state)?,
            computation: TaxComputation {
                profit: row.profit,
                taxable_base: row.taxable_base,
                tax: row.tax,
            },
            accrual_entry: row.accrual_entry.map(JournalEntryId::from_uuid),
            reversal_entry: row.reversal_entry.map(JournalEntryId::from_uuid),
            accrued_at: row.accrued_at,
            filed_at: row.filed_at,
            reversed_at: row.reversed_at,
        })
    }
}

const COLUMNS: &str = "id, lock_key, country, period_start, period_end, scope, state, profit, taxable_base, tax, \
                       accrual_entry, reversal_entry, accrued_at, filed_at, reversed_at";

pub struct FilingRepository;

impl FilingRepository {
    pub async fn find(conn: &mut PgConnection, id: TaxFilingId) -> Result<Option<CorporateTaxFiling>, DatabaseError> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {COLUMNS} FROM corporate_tax_filings WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await?;
        row.map(CorporateTaxFiling::try_from).transpose()
    }

    pub async fn find_by_key(
        conn: &mut PgConnection,
        key: &TaxPeriodKey,
    ) -> Result<Option<CorporateTaxFiling>, DatabaseError> {
        let row = sqlx::query_as::<_, FilingRow>(&format!(
            "SELECT {COLUMNS} FROM corporate_tax_filings WHERE lock_key = $1"
        ))
        .bind(key.lock_key())
        .fetch_optional(conn)
        .await?;
        row.map(CorporateTaxFiling::try_from).transpose()
    }

    /// The period key of a filing, without its other columns
    pub async fn key_of(conn: &mut PgConnection, id: TaxFilingId) -> Result<Option<TaxPeriodKey>, DatabaseError> {
        Ok(Self::find(conn, id).await?.map(|filing| filing.key))
    }

    /// Inserts or updates a filing
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` when another filing already holds the period.
    pub async fn upsert(conn: &mut PgConnection, filing: &CorporateTaxFiling) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO corporate_tax_filings (
                id, lock_key, country, period_start, period_end, scope, state,
                profit, taxable_base, tax, accrual_entry, reversal_entry,
                accrued_at, filed_at, reversed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                profit = EXCLUDED.profit,
                taxable_base = EXCLUDED.taxable_base,
                tax = EXCLUDED.tax,
                accrual_entry = EXCLUDED.accrual_entry,
                reversal_entry = EXCLUDED.reversal_entry,
                accrued_at = EXCLUDED.accrued_at,
                filed_at = EXCLUDED.filed_at,
                reversed_at = EXCLUDED.reversed_at
            "#,
        )
        .bind(*filing.id.as_uuid())
        .bind(filing.key.lock_key())
        .bind(&filing.key.country)
        .bind(filing.key.period_start)
        .bind(filing.key.period_end)
        .bind(&filing.key.scope)
        .bind(filing.state.as_str())
        .bind(filing.computation.profit)
        .bind(filing.computation.taxable_base)
        .bind(filing.computation.tax)
        .bind(filing.accrual_entry.map(|id| *id.as_uuid()))
        .bind(filing.reversal_entry.map(|id| *id.as_uuid()))
        .bind(filing.accrued_at)
        .bind(filing.filed_at)
        .bind(filing.reversed_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}

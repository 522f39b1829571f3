//! Exchange rate repository

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};

use core_kernel::{Currency, ExchangeRate, RateType};

use super::parse_column;
use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRateRow {
    pub from_currency: String,
    pub to_currency: String,
    pub rate_date: NaiveDate,
    pub rate_type: String,
    pub rate: Decimal,
}

impl TryFrom<ExchangeRateRow> for ExchangeRate {
    type Error = DatabaseError;

    fn try_from(row: ExchangeRateRow) -> Result<Self, Self::Error> {
        Ok(ExchangeRate {
            from: parse_column::<Currency>("exchange_rates.from_currency", &row.from_currency)?,
            to: parse_column::<Currency>("exchange_rates.to_currency", &row.to_currency)?,
            rate_date: row.rate_date,
            rate_type: parse_column::<RateType>("exchange_rates.rate_type", &row.rate_type)?,
            rate: row.rate,
        })
    }
}

pub struct RateRepository;

impl RateRepository {
    pub async fn exact(
        conn: &mut PgConnection,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, DatabaseError> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            r#"
            SELECT from_currency, to_currency, rate_date, rate_type, rate
            FROM exchange_rates
            WHERE from_currency = $1 AND to_currency = $2 AND rate_type = $3 AND rate_date = $4
            "#,
        )
        .bind(from.code())
        .bind(to.code())
        .bind(rate_type.as_str())
        .bind(date)
        .fetch_optional(conn)
        .await?;
        row.map(ExchangeRate::try_from).transpose()
    }

    pub async fn latest_on_or_before(
        conn: &mut PgConnection,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, DatabaseError> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            r#"
            SELECT from_currency, to_currency, rate_date, rate_type, rate
            FROM exchange_rates
            WHERE from_currency = $1 AND to_currency = $2 AND rate_type = $3 AND rate_date <= $4
            ORDER BY rate_date DESC
            LIMIT 1
            "#,
        )
        .bind(from.code())
        .bind(to.code())
        .bind(rate_type.as_str())
        .bind(date)
        .fetch_optional(conn)
        .await?;
        row.map(ExchangeRate::try_from).transpose()
    }

    /// Publishes a rate, replacing any rate for the same pair, type and date
    pub async fn upsert(conn: &mut PgConnection, rate: &ExchangeRate) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates (from_currency, to_currency, rate_date, rate_type, rate)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (from_currency, to_currency, rate_type, rate_date) DO UPDATE
            SET rate = EXCLUDED.rate
            "#,
        )
        .bind(rate.from.code())
        .bind(rate.to.code())
        .bind(rate.rate_date)
        .bind(rate.rate_type.as_str())
        .bind(rate.rate)
        .execute(conn)
        .await?;
        Ok(())
    }
}

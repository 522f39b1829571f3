//! PostgreSQL rate table
//!
//! Reads and publishes rows of `exchange_rates`. Pair inversion and the
//! same-currency short cut stay in `core_kernel::resolve_exchange_rate`;
//! this adapter only answers direct look-ups.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    AdapterHealth, Currency, DomainPort, ExchangeRate, HealthCheckResult, HealthCheckable,
    PortError, RateSource, RateType,
};

use crate::error::DatabaseError;
use crate::repositories::RateRepository;

#[derive(Debug, Clone)]
pub struct PgRateTable {
    pool: PgPool,
}

impl PgRateTable {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Publishes a rate, replacing an existing one for the same day
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` for a non-positive rate.
    #[instrument(skip(self), fields(from = %rate.from, to = %rate.to, date = %rate.rate_date))]
    pub async fn insert(&self, rate: &ExchangeRate) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        RateRepository::upsert(&mut conn, rate).await
    }
}

impl DomainPort for PgRateTable {}

#[async_trait]
impl HealthCheckable for PgRateTable {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exchange_rates")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(0) => (AdapterHealth::Degraded, Some("Rate table is empty".to_string())),
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };

        HealthCheckResult {
            adapter_id: "postgres-rate-table".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl RateSource for PgRateTable {
    async fn rate_on(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(RateRepository::exact(&mut conn, from, to, date, rate_type).await?)
    }

    async fn latest_rate_on_or_before(
        &self,
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate_type: RateType,
    ) -> Result<Option<ExchangeRate>, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(RateRepository::latest_on_or_before(&mut conn, from, to, date, rate_type).await?)
    }
}

//! Payment repository
//!
//! Payments are stored whole in `body`. `payment_allocations` repeats each
//! allocation, rewritten on every save, so settlements can be looked up by
//! document.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use core_kernel::{AllocationId, Currency, DocumentId, PaymentId};
use domain_ledger::{Allocation, Payment, SettledAllocation};

use super::parse_column;
use crate::error::DatabaseError;

/// An allocation joined with the header of its posted payment
#[derive(Debug, Clone, FromRow)]
pub struct SettledAllocationRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub amount: Decimal,
    pub invoice_exchange_rate: Option<Decimal>,
    pub invoice_rate_resolved: bool,
    pub payment_id: Uuid,
    pub payment_currency: String,
    pub payment_date: NaiveDate,
}

impl TryFrom<SettledAllocationRow> for SettledAllocation {
    type Error = DatabaseError;

    fn try_from(row: SettledAllocationRow) -> Result<Self, Self::Error> {
        Ok(SettledAllocation {
            payment_id: PaymentId::from_uuid(row.payment_id),
            payment_currency: parse_column::<Currency>("payments.currency", &row.payment_currency)?,
            payment_date: row.payment_date,
            allocation: Allocation {
                id: AllocationId::from_uuid(row.id),
                document_id: DocumentId::from_uuid(row.document_id),
                amount: row.amount,
                invoice_exchange_rate: row.invoice_exchange_rate,
                invoice_rate_resolved: row.invoice_rate_resolved,
            },
        })
    }
}

pub struct PaymentRepository;

impl PaymentRepository {
    pub async fn find(conn: &mut PgConnection, id: PaymentId) -> Result<Option<Payment>, DatabaseError> {
        let body = sqlx::query_scalar::<_, Json<Payment>>("SELECT body FROM payments WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(conn)
            .await?;
        Ok(body.map(|b| b.0))
    }

    /// Reads a payment under `FOR UPDATE`
    pub async fn lock(conn: &mut PgConnection, id: PaymentId) -> Result<Option<Payment>, DatabaseError> {
        let body = sqlx::query_scalar::<_, Json<Payment>>("SELECT body FROM payments WHERE id = $1 FOR UPDATE")
            .bind(*id.as_uuid())
            .fetch_optional(conn)
            .await?;
        Ok(body.map(|b| b.0))
    }

    /// Inserts or replaces a payment and rewrites its allocation rows
    pub async fn upsert(conn: &mut PgConnection, payment: &Payment) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, number, direction, currency, payment_date, amount, gl_journal, body, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (id) DO UPDATE
            SET number = EXCLUDED.number,
                direction = EXCLUDED.direction,
                currency = EXCLUDED.currency,
                payment_date = EXCLUDED.payment_date,
                amount = EXCLUDED.amount,
                gl_journal = EXCLUDED.gl_journal,
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(*payment.id.as_uuid())
        .bind(&payment.number)
        .bind(payment.direction.as_str())
        .bind(payment.currency.code())
        .bind(payment.date)
        .bind(payment.amount)
        .bind(payment.gl_journal.map(|id| *id.as_uuid()))
        .bind(Json(payment))
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM payment_allocations WHERE payment_id = $1")
            .bind(*payment.id.as_uuid())
            .execute(&mut *conn)
            .await?;

        for allocation in payment.allocations() {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (
                    id, payment_id, document_id, amount, invoice_exchange_rate, invoice_rate_resolved
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(*allocation.id.as_uuid())
            .bind(*payment.id.as_uuid())
            .bind(*allocation.document_id.as_uuid())
            .bind(allocation.amount)
            .bind(allocation.invoice_exchange_rate)
            .bind(allocation.invoice_rate_resolved)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Allocations of posted payments against a document, oldest payment first
    pub async fn settled_allocations(
        conn: &mut PgConnection,
        document: DocumentId,
    ) -> Result<Vec<SettledAllocation>, DatabaseError> {
        let rows = sqlx::query_as::<_, SettledAllocationRow>(
            r#"
            SELECT a.id, a.document_id, a.amount, a.invoice_exchange_rate, a.invoice_rate_resolved,
                   p.id AS payment_id, p.currency AS payment_currency, p.payment_date
            FROM payment_allocations a
            JOIN payments p ON p.id = a.payment_id
            WHERE a.document_id = $1
              AND p.gl_journal IS NOT NULL
            ORDER BY p.payment_date, p.id
            "#,
        )
        .bind(*document.as_uuid())
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(SettledAllocation::try_from).collect()
    }
}

//! Document repository
//!
//! A document is stored whole in `body`; the columns beside it are copies of
//! the fields the ledger filters and locks on.

use sqlx::types::Json;
use sqlx::PgConnection;

use core_kernel::DocumentId;
use domain_ledger::{Document, DocumentKind};

use crate::error::DatabaseError;

pub struct DocumentRepository;

impl DocumentRepository {
    pub async fn find(conn: &mut PgConnection, id: DocumentId) -> Result<Option<Document>, DatabaseError> {
        let body = sqlx::query_scalar::<_, Json<Document>>("SELECT body FROM documents WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(conn)
            .await?;
        Ok(body.map(|b| b.0))
    }

    /// Reads a document under `FOR UPDATE`
    pub async fn lock(conn: &mut PgConnection, id: DocumentId) -> Result<Option<Document>, DatabaseError> {
        let body = sqlx::query_scalar::<_, Json<Document>>("SELECT body FROM documents WHERE id = $1 FOR UPDATE")
            .bind(*id.as_uuid())
            .fetch_optional(conn)
            .await?;
        Ok(body.map(|b| b.0))
    }

    /// Posted documents with an outstanding balance, by date then number
    pub async fn open(conn: &mut PgConnection, kind: Option<DocumentKind>) -> Result<Vec<Document>, DatabaseError> {
        let bodies = sqlx::query_scalar::<_, Json<Document>>(
            r#"
            SELECT body FROM documents
            WHERE gl_journal IS NOT NULL
              AND balance > 0
              AND ($1::text IS NULL OR kind = $1)
            ORDER BY document_date, number
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(conn)
        .await?;
        Ok(bodies.into_iter().map(|b| b.0).collect())
    }

    /// Inserts a document or replaces the stored one
    pub async fn upsert(conn: &mut PgConnection, document: &Document) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, number, kind, currency, document_date, due_date, scope,
                balance, payment_status, gl_journal, body, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (id) DO UPDATE
            SET number = EXCLUDED.number,
                kind = EXCLUDED.kind,
                currency = EXCLUDED.currency,
                document_date = EXCLUDED.document_date,
                due_date = EXCLUDED.due_date,
                scope = EXCLUDED.scope,
                balance = EXCLUDED.balance,
                payment_status = EXCLUDED.payment_status,
                gl_journal = EXCLUDED.gl_journal,
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(*document.id.as_uuid())
        .bind(&document.number)
        .bind(document.kind.as_str())
        .bind(document.currency.code())
        .bind(document.date)
        .bind(document.due_date)
        .bind(&document.scope)
        .bind(document.balance)
        .bind(document.payment_status.as_str())
        .bind(document.gl_journal.map(|id| *id.as_uuid()))
        .bind(Json(document))
        .execute(conn)
        .await?;
        Ok(())
    }
}

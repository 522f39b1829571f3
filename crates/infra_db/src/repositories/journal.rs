//! Journal repository
//!
//! `journal_entries` and `journal_lines` are append-only. An entry and its
//! lines are written in one call on the caller's transaction; there is no
//! update or delete path.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use uuid::Uuid;

use core_kernel::{Currency, JournalEntryId, JournalLineId};
use domain_ledger::{AccountClass, EntrySource, JournalEntry, JournalLine, LineQuery, PostedLine, Segment};

use super::parse_column;
use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct JournalEntryRow {
    pub id: Uuid,
    pub entry_date: NaiveDate,
    pub currency: String,
    pub memo: String,
    pub posted: bool,
    pub fiscal_period: Option<String>,
    pub scope: Option<String>,
    pub source_kind: String,
    pub source_id: Uuid,
    pub reverses: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalLineRow {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub line_no: i32,
    pub account_code: String,
    pub segment: Json<Segment>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub memo: Option<String>,
}

impl From<JournalLineRow> for JournalLine {
    fn from(row: JournalLineRow) -> Self {
        JournalLine {
            id: JournalLineId::from_uuid(row.id),
            account_code: row.account_code,
            segment: row.segment.0,
            debit: row.debit,
            credit: row.credit,
            memo: row.memo,
        }
    }
}

/// A posted line joined with its entry header and account class
#[derive(Debug, Clone, FromRow)]
pub struct PostedLineRow {
    pub entry_id: Uuid,
    pub entry_date: NaiveDate,
    pub scope: Option<String>,
    pub account_code: String,
    pub class: Option<String>,
    pub segment: Json<Segment>,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl TryFrom<PostedLineRow> for PostedLine {
    type Error = DatabaseError;

    fn try_from(row: PostedLineRow) -> Result<Self, Self::Error> {
        let account_class = row
            .class
            .as_deref()
            .map(|class| parse_column::<AccountClass>("ledger_accounts.class", class))
            .transpose()?;
        Ok(PostedLine {
            entry_id: JournalEntryId::from_uuid(row.entry_id),
            entry_date: row.entry_date,
            scope: row.scope,
            account_code: row.account_code,
            account_class,
            segment: row.segment.0,
            debit: row.debit,
            credit: row.credit,
        })
    }
}

fn assemble(row: JournalEntryRow, lines: Vec<JournalLineRow>) -> Result<JournalEntry, DatabaseError> {
    let source = EntrySource::from_parts(&row.source_kind, row.source_id)
        .map_err(|e| DatabaseError::corrupt("journal_entries.source_kind", e))?;
    Ok(JournalEntry {
        id: JournalEntryId::from_uuid(row.id),
        date: row.entry_date,
        currency: parse_column::<Currency>("journal_entries.currency", &row.currency)?,
        memo: row.memo,
        posted: row.posted,
        fiscal_period: row.fiscal_period,
        scope: row.scope,
        source,
        reverses: row.reverses.map(JournalEntryId::from_uuid),
        lines: lines.into_iter().map(JournalLine::from).collect(),
        created_at: row.created_at,
    })
}

const ENTRY_COLUMNS: &str = "id, entry_date, currency, memo, posted, fiscal_period, scope, source_kind, source_id, reverses, created_at";

const LINE_COLUMNS: &str = "id, entry_id, line_no, account_code, segment, debit, credit, memo";

/// Appends and reads journal entries
pub struct JournalRepository;

impl JournalRepository {
    /// Writes an entry header and its lines
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` when the entry id already exists, `ForeignKeyViolation`
    /// when a line references an account missing from the chart.
    pub async fn insert(conn: &mut PgConnection, entry: &JournalEntry) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (
                id, entry_date, currency, memo, posted, fiscal_period, scope,
                source_kind, source_id, reverses, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(entry.date)
        .bind(entry.currency.code())
        .bind(&entry.memo)
        .bind(entry.posted)
        .bind(&entry.fiscal_period)
        .bind(&entry.scope)
        .bind(entry.source.kind())
        .bind(entry.source.reference())
        .bind(entry.reverses.map(|id| *id.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        for (line_no, line) in entry.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO journal_lines (id, entry_id, line_no, account_code, segment, debit, credit, memo)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(*line.id.as_uuid())
            .bind(*entry.id.as_uuid())
            .bind(line_no as i32)
            .bind(&line.account_code)
            .bind(Json(&line.segment))
            .bind(line.debit)
            .bind(line.credit)
            .bind(&line.memo)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn find(conn: &mut PgConnection, id: JournalEntryId) -> Result<Option<JournalEntry>, DatabaseError> {
        let row = sqlx::query_as::<_, JournalEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, JournalLineRow>(&format!(
            "SELECT {LINE_COLUMNS} FROM journal_lines WHERE entry_id = $1 ORDER BY line_no"
        ))
        .bind(row.id)
        .fetch_all(&mut *conn)
        .await?;

        assemble(row, lines).map(Some)
    }

    /// Entries whose source reference is `source`, oldest first
    pub async fn for_source(conn: &mut PgConnection, source: Uuid) -> Result<Vec<JournalEntry>, DatabaseError> {
        let rows = sqlx::query_as::<_, JournalEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE source_id = $1 ORDER BY created_at, id"
        ))
        .bind(source)
        .fetch_all(&mut *conn)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let line_rows = sqlx::query_as::<_, JournalLineRow>(&format!(
            "SELECT {LINE_COLUMNS} FROM journal_lines WHERE entry_id = ANY($1) ORDER BY entry_id, line_no"
        ))
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut lines: HashMap<Uuid, Vec<JournalLineRow>> = HashMap::new();
        for line in line_rows {
            lines.entry(line.entry_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let entry_lines = lines.remove(&row.id).unwrap_or_default();
                assemble(row, entry_lines)
            })
            .collect()
    }

    /// Lines of posted entries matching the query, with their account class
    pub async fn posted_lines(conn: &mut PgConnection, query: &LineQuery) -> Result<Vec<PostedLine>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostedLineRow>(
            r#"
            SELECT l.entry_id, e.entry_date, e.scope, l.account_code, a.class,
                   l.segment, l.debit, l.credit
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            LEFT JOIN ledger_accounts a ON a.code = l.account_code
            WHERE e.posted
              AND ($1::date IS NULL OR e.entry_date >= $1)
              AND ($2::date IS NULL OR e.entry_date <= $2)
              AND ($3::text IS NULL OR e.scope = $3)
            ORDER BY e.entry_date, l.entry_id, l.line_no
            "#,
        )
        .bind(query.from)
        .bind(query.to)
        .bind(&query.scope)
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(PostedLine::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::DocumentId;
    use rust_decimal_macros::dec;

    fn header(source_kind: &str) -> JournalEntryRow {
        JournalEntryRow {
            id: Uuid::now_v7(),
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            currency: "AED".into(),
            memo: "Invoice INV-1".into(),
            posted: true,
            fiscal_period: None,
            scope: Some("org-1".into()),
            source_kind: source_kind.into(),
            source_id: Uuid::now_v7(),
            reverses: None,
            created_at: Utc::now(),
        }
    }

    fn line(entry_id: Uuid, line_no: i32, account: &str, debit: Decimal, credit: Decimal) -> JournalLineRow {
        JournalLineRow {
            id: Uuid::now_v7(),
            entry_id,
            line_no,
            account_code: account.into(),
            segment: Json(Segment::new().with("document", "INV-1")),
            debit,
            credit,
            memo: None,
        }
    }

    #[test]
    fn test_assemble_entry() {
        let row = header("document");
        let source_id = row.source_id;
        let lines = vec![
            line(row.id, 0, "1100", dec!(105), Decimal::ZERO),
            line(row.id, 1, "4000", Decimal::ZERO, dec!(105)),
        ];

        let entry = assemble(row, lines).unwrap();

        assert_eq!(entry.source, EntrySource::Document(DocumentId::from_uuid(source_id)));
        assert_eq!(entry.currency, Currency::AED);
        assert!(entry.is_balanced());
        assert_eq!(entry.lines[0].segment.get("document"), Some("INV-1"));
    }

    #[test]
    fn test_unknown_source_kind_is_corrupt() {
        let err = assemble(header("voucher"), Vec::new()).unwrap_err();
        assert!(matches!(err, DatabaseError::SerializationError(_)));
    }

    #[test]
    fn test_posted_line_without_account_has_no_class() {
        let row = PostedLineRow {
            entry_id: Uuid::now_v7(),
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            scope: None,
            account_code: "4000".into(),
            class: None,
            segment: Json(Segment::new()),
            debit: Decimal::ZERO,
            credit: dec!(100),
        };

        let line = PostedLine::try_from(row).unwrap();
        assert_eq!(line.account_class, None);
        assert_eq!(line.credit, dec!(100));
    }
}

//! Chart of accounts repository

use sqlx::{FromRow, PgConnection};

use domain_ledger::{Account, AccountClass};

use super::parse_column;
use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub code: String,
    pub name: String,
    pub class: String,
    pub parent_code: Option<String>,
    pub is_active: bool,
}

impl TryFrom<AccountRow> for Account {
    type Error = DatabaseError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            class: parse_column::<AccountClass>("ledger_accounts.class", &row.class)?,
            code: row.code,
            name: row.name,
            parent_code: row.parent_code,
            is_active: row.is_active,
        })
    }
}

/// Reads and maintains `ledger_accounts`
pub struct AccountRepository;

impl AccountRepository {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Account>, DatabaseError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT code, name, class, parent_code, is_active
            FROM ledger_accounts
            ORDER BY code
            "#,
        )
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    pub async fn by_code(conn: &mut PgConnection, code: &str) -> Result<Option<Account>, DatabaseError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT code, name, class, parent_code, is_active
            FROM ledger_accounts
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(conn)
        .await?;

        row.map(Account::try_from).transpose()
    }

    /// Inserts an account or updates its name, class, parent and active flag
    ///
    /// Parents must be written before their children.
    pub async fn upsert(conn: &mut PgConnection, account: &Account) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_accounts (code, name, class, parent_code, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name,
                class = EXCLUDED.class,
                parent_code = EXCLUDED.parent_code,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.class.as_str())
        .bind(&account.parent_code)
        .bind(account.is_active)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(class: &str) -> AccountRow {
        AccountRow {
            code: "4900".into(),
            name: "FX Gain".into(),
            class: class.into(),
            parent_code: Some("4000".into()),
            is_active: true,
        }
    }

    #[test]
    fn test_row_maps_to_account() {
        let account = Account::try_from(row("INCOME")).unwrap();
        assert_eq!(account.class, AccountClass::Income);
        assert_eq!(account.parent_code.as_deref(), Some("4000"));
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        assert!(Account::try_from(row("ASSETS")).is_err());
    }
}

//! Accounts table.
//!
//! ```text
//! accounts(
//!     account_number       text primary key,
//!     name                 text not null,
//!     balance              bigint not null,
//!     available_balance    bigint not null,
//!     pending_transactions jsonb not null default '[]',
//!     status               text not null,
//!     open_date            timestamptz not null,
//!     close_date           timestamptz
//! )
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use forgepay_accounting::{
    Account, AccountSearchConditions, AccountStatus, HoldResolution, PendingTransaction,
};
use forgepay_core::{AccountNumber, TransactionId, WriteOutcome};

use super::{get_column, get_enum, get_json, map_sqlx_error};
use crate::store::{AccountStore, StoreResult};

const ACCOUNT_COLUMNS: &str = "account_number, name, balance, available_balance, \
    pending_transactions, status, open_date, close_date";

/// Postgres account store.
#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: Arc<PgPool>,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_updated(
        &self,
        operation: &str,
        query: Query<'_, Postgres, PgArguments>,
    ) -> StoreResult<WriteOutcome<Account>> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|row| account_from_row(&row)).transpose().map(WriteOutcome::from)
    }
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let account_number: String = get_column(row, "account_number")?;
    Ok(Account {
        account_number: AccountNumber::new(account_number)
            .map_err(|e| super::decode_error("account_number", e))?,
        name: get_column(row, "name")?,
        balance: get_column(row, "balance")?,
        available_balance: get_column(row, "available_balance")?,
        pending_transactions: get_json(row, "pending_transactions")?,
        status: get_enum(row, "status")?,
        open_date: get_column(row, "open_date")?,
        close_date: get_column(row, "close_date")?,
    })
}

/// `@>` operand matching any hold of `transaction_id`.
fn hold_containment(transaction_id: &TransactionId) -> serde_json::Value {
    serde_json::json!([{ "id": transaction_id.to_string() }])
}

/// Escape `%`, `_` and `\` for a literal `ILIKE` match.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    #[instrument(skip(self, account), fields(account_number = %account.account_number), err)]
    async fn insert(&self, account: Account) -> StoreResult<Account> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                account_number, name, balance, available_balance,
                pending_transactions, status, open_date, close_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.account_number.as_str())
        .bind(&account.name)
        .bind(account.balance)
        .bind(account.available_balance)
        .bind(Json(&account.pending_transactions))
        .bind(account.status.as_str())
        .bind(account.open_date)
        .bind(account.close_date)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;

        Ok(account)
    }

    async fn get(&self, account_number: &AccountNumber) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1"
        ))
        .bind(account_number.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_account", e))?;

        row.map(|row| account_from_row(&row)).transpose()
    }

    #[instrument(skip(self), fields(account_number = %account_number), err)]
    async fn close_if_idle(
        &self,
        account_number: &AccountNumber,
        close_date: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Account>> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET status = 'Closed', close_date = $2
            WHERE account_number = $1
              AND status = 'Opened'
              AND jsonb_array_length(pending_transactions) = 0
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let query = sqlx::query(&sql)
            .bind(account_number.as_str())
            .bind(close_date);
        self.fetch_updated("close_account", query).await
    }

    #[instrument(skip(self, hold), fields(account_number = %account_number, transaction_id = %hold.id), err)]
    async fn authorize(
        &self,
        account_number: &AccountNumber,
        hold: PendingTransaction,
    ) -> StoreResult<WriteOutcome<Account>> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET available_balance = available_balance - $2,
                pending_transactions = pending_transactions || $3
            WHERE account_number = $1
              AND status = 'Opened'
              AND available_balance >= $2
              AND NOT pending_transactions @> $4
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let amount = hold.amount;
        let containment = hold_containment(&hold.id);
        let query = sqlx::query(&sql)
            .bind(account_number.as_str())
            .bind(amount)
            .bind(Json(vec![hold]))
            .bind(containment);
        self.fetch_updated("authorize_amount", query).await
    }

    #[instrument(skip(self, hold), fields(account_number = %account_number, transaction_id = %hold.id), err)]
    async fn start_pending(
        &self,
        account_number: &AccountNumber,
        hold: PendingTransaction,
    ) -> StoreResult<WriteOutcome<Account>> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET pending_transactions = pending_transactions || $2
            WHERE account_number = $1
              AND status = 'Opened'
              AND NOT pending_transactions @> $3
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let containment = hold_containment(&hold.id);
        let query = sqlx::query(&sql)
            .bind(account_number.as_str())
            .bind(Json(vec![hold]))
            .bind(containment);
        self.fetch_updated("start_transaction", query).await
    }

    #[instrument(skip(self), fields(account_number = %account_number, transaction_id = %transaction_id), err)]
    async fn resolve_hold(
        &self,
        account_number: &AccountNumber,
        transaction_id: &TransactionId,
        resolution: HoldResolution,
        amount: i64,
    ) -> StoreResult<WriteOutcome<Account>> {
        // The containment check makes a second resolution of the same hold a
        // no-op; the subselect drops every element carrying the id.
        let sql = format!(
            r#"
            UPDATE accounts
            SET balance = balance + $3,
                available_balance = available_balance + $4,
                pending_transactions = (
                    SELECT COALESCE(jsonb_agg(hold), '[]'::jsonb)
                    FROM jsonb_array_elements(pending_transactions) AS hold
                    WHERE hold->>'id' <> $2
                )
            WHERE account_number = $1
              AND pending_transactions @> $5
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let (balance_delta, available_delta) = resolution.deltas(amount);
        let id = transaction_id.to_string();
        let containment = hold_containment(transaction_id);
        let query = sqlx::query(&sql)
            .bind(account_number.as_str())
            .bind(&id)
            .bind(balance_delta)
            .bind(available_delta)
            .bind(containment);
        self.fetch_updated(resolution.as_str(), query).await
    }

    async fn search(&self, conditions: &AccountSearchConditions) -> StoreResult<Vec<Account>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE TRUE"));

        if let Some(numbers) = &conditions.account_numbers {
            let numbers: Vec<String> = numbers.iter().map(|n| n.as_str().to_string()).collect();
            builder.push(" AND account_number = ANY(");
            builder.push_bind(numbers);
            builder.push(")");
        }
        if let Some(statuses) = &conditions.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder.push(" AND status = ANY(");
            builder.push_bind(statuses);
            builder.push(")");
        }
        if let Some(name) = &conditions.name {
            builder.push(" AND name ILIKE ");
            builder.push_bind(like_pattern(name));
        }
        builder.push(" ORDER BY account_number ASC LIMIT ");
        builder.push_bind(i64::try_from(conditions.limit).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_accounts", e))?;

        rows.iter().map(account_from_row).collect()
    }
}

//! Transactions table.
//!
//! ```text
//! transactions(
//!     id                       uuid primary key,
//!     type_of                  text not null,
//!     status                   text not null,
//!     agent                    jsonb not null,
//!     recipient                jsonb not null,
//!     object                   jsonb not null,
//!     result                   jsonb,
//!     error                    jsonb,
//!     potential_actions        jsonb,
//!     expires                  timestamptz not null,
//!     start_date               timestamptz not null,
//!     end_date                 timestamptz,
//!     tasks_exportation_status text not null,
//!     tasks_exported_at        timestamptz,
//!     updated_at               timestamptz not null
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
use uuid::Uuid;

use forgepay_core::{TransactionId, WriteOutcome};
use forgepay_transactions::{
    ExpireConditions, PotentialActions, Transaction, TransactionSearchConditions,
    TransactionStatus, TransactionType,
};

use super::{get_column, get_enum, get_json, get_json_opt, map_sqlx_error};
use crate::store::{StoreResult, TransactionStore};

const TRANSACTION_COLUMNS: &str = "id, type_of, status, agent, recipient, object, result, \
    error, potential_actions, expires, start_date, end_date, tasks_exportation_status, \
    tasks_exported_at, updated_at";

/// Postgres transaction store.
#[derive(Debug, Clone)]
pub struct PostgresTransactionStore {
    pool: Arc<PgPool>,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_one_optional(
        &self,
        operation: &str,
        query: Query<'_, Postgres, PgArguments>,
    ) -> StoreResult<Option<Transaction>> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|row| transaction_from_row(&row)).transpose()
    }
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    let id: Uuid = get_column(row, "id")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(id),
        type_of: get_enum(row, "type_of")?,
        status: get_enum(row, "status")?,
        agent: get_json(row, "agent")?,
        recipient: get_json(row, "recipient")?,
        object: get_json(row, "object")?,
        result: get_json_opt(row, "result")?,
        error: get_json_opt(row, "error")?,
        potential_actions: get_json_opt(row, "potential_actions")?,
        expires: get_column(row, "expires")?,
        start_date: get_column(row, "start_date")?,
        end_date: get_column(row, "end_date")?,
        tasks_exportation_status: get_enum(row, "tasks_exportation_status")?,
        tasks_exported_at: get_column(row, "tasks_exported_at")?,
        updated_at: get_column(row, "updated_at")?,
    })
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id), err)]
    async fn insert(&self, transaction: Transaction) -> StoreResult<Transaction> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, type_of, status, agent, recipient, object, result, error,
                potential_actions, expires, start_date, end_date,
                tasks_exportation_status, tasks_exported_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.type_of.as_str())
        .bind(transaction.status.as_str())
        .bind(Json(&transaction.agent))
        .bind(Json(&transaction.recipient))
        .bind(Json(&transaction.object))
        .bind(transaction.result.as_ref().map(Json))
        .bind(transaction.error.as_ref().map(Json))
        .bind(transaction.potential_actions.as_ref().map(Json))
        .bind(transaction.expires)
        .bind(transaction.start_date)
        .bind(transaction.end_date)
        .bind(transaction.tasks_exportation_status.as_str())
        .bind(transaction.tasks_exported_at)
        .bind(transaction.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        Ok(transaction)
    }

    async fn get(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE type_of = $1 AND id = $2"
        );
        let query = sqlx::query(&sql).bind(type_of.as_str()).bind(id.as_uuid());
        self.fetch_one_optional("get_transaction", query).await
    }

    #[instrument(skip(self, result, potential_actions), fields(transaction_id = %id), err)]
    async fn confirm_if_in_progress(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        result: serde_json::Value,
        potential_actions: Option<PotentialActions>,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = 'Confirmed', result = $3, potential_actions = $4,
                end_date = $5, updated_at = $5
            WHERE type_of = $1 AND id = $2 AND status = 'InProgress'
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let query = sqlx::query(&sql)
            .bind(type_of.as_str())
            .bind(id.as_uuid())
            .bind(result)
            .bind(potential_actions.map(Json))
            .bind(now);
        self.fetch_one_optional("confirm_transaction", query)
            .await
            .map(WriteOutcome::from)
    }

    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn cancel_if_in_progress(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = 'Canceled', end_date = $3, updated_at = $3
            WHERE type_of = $1 AND id = $2 AND status = 'InProgress'
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let query = sqlx::query(&sql)
            .bind(type_of.as_str())
            .bind(id.as_uuid())
            .bind(now);
        self.fetch_one_optional("cancel_transaction", query)
            .await
            .map(WriteOutcome::from)
    }

    #[instrument(skip(self), err)]
    async fn expire_overdue(
        &self,
        conditions: &ExpireConditions,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'Expired', end_date = $1, updated_at = $1
            WHERE status = 'InProgress'
              AND expires < $1
              AND ($2::text IS NULL OR type_of = $2)
            "#,
        )
        .bind(now)
        .bind(conditions.type_of.map(|t| t.as_str()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("make_expired", e))?;

        Ok(result.rows_affected())
    }

    async fn claim_for_export(
        &self,
        type_of: Option<TransactionType>,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET tasks_exportation_status = 'Exporting', updated_at = $3
            WHERE id = (
                SELECT id FROM transactions
                WHERE ($1::text IS NULL OR type_of = $1)
                  AND status = $2
                  AND tasks_exportation_status = 'Unexported'
                ORDER BY updated_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
              AND tasks_exportation_status = 'Unexported'
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let query = sqlx::query(&sql)
            .bind(type_of.map(|t| t.as_str()))
            .bind(status.as_str())
            .bind(now);
        self.fetch_one_optional("start_export_tasks", query).await
    }

    async fn mark_exported(
        &self,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET tasks_exportation_status = 'Exported', tasks_exported_at = $2, updated_at = $2
            WHERE id = $1
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let query = sqlx::query(&sql).bind(id.as_uuid()).bind(now);
        self.fetch_one_optional("set_tasks_exported", query)
            .await
            .map(WriteOutcome::from)
    }

    #[instrument(skip(self), err)]
    async fn reset_stale_exports(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET tasks_exportation_status = 'Unexported', updated_at = $2
            WHERE tasks_exportation_status = 'Exporting'
              AND updated_at < $1
            "#,
        )
        .bind(before)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reexport_tasks", e))?;

        Ok(result.rows_affected())
    }

    async fn search(
        &self,
        conditions: &TransactionSearchConditions,
    ) -> StoreResult<Vec<Transaction>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE type_of = "
        ));
        builder.push_bind(conditions.type_of.as_str());
        builder.push(" AND start_date >= ");
        builder.push_bind(conditions.start_from);
        builder.push(" AND start_date <= ");
        builder.push_bind(conditions.start_through);
        if let Some(statuses) = &conditions.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder.push(" AND status = ANY(");
            builder.push_bind(statuses);
            builder.push(")");
        }
        builder.push(" ORDER BY start_date ASC, id ASC");
        if let Some(limit) = conditions.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_transactions", e))?;

        rows.iter().map(transaction_from_row).collect()
    }
}

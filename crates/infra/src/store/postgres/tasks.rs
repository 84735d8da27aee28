//! Tasks table.
//!
//! ```text
//! tasks(
//!     id                uuid primary key,
//!     name              text not null,
//!     status            text not null,
//!     runs_at           timestamptz not null,
//!     last_tried_at     timestamptz,
//!     number_of_tried   integer not null,
//!     number_of_tries   integer not null,
//!     execution_results jsonb not null default '[]',
//!     data              jsonb not null
//! )
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use forgepay_core::{TaskId, WriteOutcome};
use forgepay_tasks::{ExecutionResult, Task, TaskName};

use super::{decode_error, get_column, get_enum, get_json, map_sqlx_error};
use crate::store::{StoreError, StoreResult, TaskStore};

const TASK_COLUMNS: &str = "id, name, status, runs_at, last_tried_at, number_of_tried, \
    number_of_tries, execution_results, data";

/// Postgres task store.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: Arc<PgPool>,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn get_count(row: &PgRow, column: &str) -> StoreResult<u32> {
    let raw: i32 = get_column(row, column)?;
    u32::try_from(raw).map_err(|e| decode_error(column, e))
}

fn to_column(value: u32, column: &str) -> StoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::Storage(format!("{} out of range: {}", column, value)))
}

fn task_from_row(row: &PgRow) -> StoreResult<Task> {
    let id: Uuid = get_column(row, "id")?;
    Ok(Task {
        id: TaskId::from_uuid(id),
        name: get_enum(row, "name")?,
        status: get_enum(row, "status")?,
        runs_at: get_column(row, "runs_at")?,
        last_tried_at: get_column(row, "last_tried_at")?,
        number_of_tried: get_count(row, "number_of_tried")?,
        number_of_tries: get_count(row, "number_of_tries")?,
        execution_results: get_json(row, "execution_results")?,
        data: get_json(row, "data")?,
    })
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.id, name = %task.name), err)]
    async fn insert(&self, task: Task) -> StoreResult<Task> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, name, status, runs_at, last_tried_at, number_of_tried,
                number_of_tries, execution_results, data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.name.as_str())
        .bind(task.status.as_str())
        .bind(task.runs_at)
        .bind(task.last_tried_at)
        .bind(to_column(task.number_of_tried, "number_of_tried")?)
        .bind(to_column(task.number_of_tries, "number_of_tries")?)
        .bind(Json(&task.execution_results))
        .bind(&task.data)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_task", e))?;

        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_task", e))?;

        row.map(|row| task_from_row(&row)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn claim_next(&self, name: TaskName, now: DateTime<Utc>) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'Running',
                last_tried_at = $2,
                number_of_tried = number_of_tried + 1
            WHERE id = (
                SELECT id FROM tasks
                WHERE name = $1 AND status = 'Ready' AND runs_at <= $2
                ORDER BY runs_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
              AND status = 'Ready'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(name.as_str())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("execute_one_by_name", e))?;

        row.map(|row| task_from_row(&row)).transpose()
    }

    #[instrument(skip(self, result), fields(task_id = %id), err)]
    async fn record_execution(
        &self,
        id: &TaskId,
        result: ExecutionResult,
    ) -> StoreResult<WriteOutcome<Task>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = CASE WHEN $2 THEN 'Executed' ELSE status END,
                execution_results = execution_results || $3
            WHERE id = $1 AND status = 'Running'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(result.is_success())
        .bind(Json(vec![result]))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_execution", e))?;

        row.map(|row| task_from_row(&row))
            .transpose()
            .map(WriteOutcome::from)
    }

    #[instrument(skip(self), err)]
    async fn reset_stale(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'Ready'
            WHERE status = 'Running'
              AND (last_tried_at IS NULL OR last_tried_at < $1)
              AND number_of_tried < number_of_tries
            "#,
        )
        .bind(before)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("retry", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn abort_one(&self, before: DateTime<Utc>) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'Aborted'
            WHERE id = (
                SELECT id FROM tasks
                WHERE status = 'Running'
                  AND (last_tried_at IS NULL OR last_tried_at < $1)
                  AND number_of_tried >= number_of_tries
                ORDER BY last_tried_at ASC NULLS FIRST, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
              AND status = 'Running'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(before)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("abort_one", e))?;

        row.map(|row| task_from_row(&row)).transpose()
    }
}

//! Actions table.
//!
//! ```text
//! actions(
//!     id            uuid primary key,
//!     type_of       text not null,
//!     action_status text not null,
//!     agent         jsonb not null,
//!     recipient     jsonb not null,
//!     object        jsonb not null,
//!     purpose       jsonb not null,
//!     result        jsonb,
//!     error         jsonb,
//!     start_date    timestamptz not null,
//!     end_date      timestamptz
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

use forgepay_core::{ActionId, WriteOutcome};
use forgepay_transactions::{Action, ActionStatus, ActionType};

use super::{get_column, get_enum, get_json, get_json_opt, map_sqlx_error};
use crate::store::{ActionStore, StoreResult};

const ACTION_COLUMNS: &str = "id, type_of, action_status, agent, recipient, object, purpose, \
    result, error, start_date, end_date";

/// Postgres action store.
#[derive(Debug, Clone)]
pub struct PostgresActionStore {
    pool: Arc<PgPool>,
}

impl PostgresActionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn action_from_row(row: &PgRow) -> StoreResult<Action> {
    let id: Uuid = get_column(row, "id")?;
    Ok(Action {
        id: ActionId::from_uuid(id),
        type_of: get_enum(row, "type_of")?,
        action_status: get_enum(row, "action_status")?,
        agent: get_json(row, "agent")?,
        recipient: get_json(row, "recipient")?,
        object: get_json(row, "object")?,
        purpose: get_json(row, "purpose")?,
        result: get_json_opt(row, "result")?,
        error: get_json_opt(row, "error")?,
        start_date: get_column(row, "start_date")?,
        end_date: get_column(row, "end_date")?,
    })
}

#[async_trait]
impl ActionStore for PostgresActionStore {
    #[instrument(skip(self, action), fields(action_id = %action.id), err)]
    async fn insert(&self, action: Action) -> StoreResult<Action> {
        sqlx::query(
            r#"
            INSERT INTO actions (
                id, type_of, action_status, agent, recipient, object, purpose,
                result, error, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(action.id.as_uuid())
        .bind(action.type_of.as_str())
        .bind(action.action_status.as_str())
        .bind(Json(&action.agent))
        .bind(Json(&action.recipient))
        .bind(Json(&action.object))
        .bind(Json(&action.purpose))
        .bind(action.result.as_ref().map(Json))
        .bind(action.error.as_ref().map(Json))
        .bind(action.start_date)
        .bind(action.end_date)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_action", e))?;

        Ok(action)
    }

    async fn get(&self, type_of: ActionType, id: &ActionId) -> StoreResult<Option<Action>> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM actions WHERE type_of = $1 AND id = $2"
        ))
        .bind(type_of.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_action", e))?;

        row.map(|row| action_from_row(&row)).transpose()
    }

    #[instrument(skip(self, result, error), fields(action_id = %id, status = %status), err)]
    async fn finish_if_active(
        &self,
        type_of: ActionType,
        id: &ActionId,
        status: ActionStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Action>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE actions
            SET action_status = $3,
                result = COALESCE($4, result),
                error = COALESCE($5, error),
                end_date = $6
            WHERE type_of = $1 AND id = $2 AND action_status = 'Active'
            RETURNING {ACTION_COLUMNS}
            "#
        ))
        .bind(type_of.as_str())
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("finish_action", e))?;

        row.map(|row| action_from_row(&row))
            .transpose()
            .map(WriteOutcome::from)
    }
}

//! Postgres-backed stores.
//!
//! Conditional writes are single `UPDATE ... WHERE <condition> RETURNING`
//! statements: an empty result is [`WriteOutcome::NoMatch`](forgepay_core::WriteOutcome).
//! Claims select their row with `FOR UPDATE SKIP LOCKED`, so concurrent
//! workers never receive the same record. Nested documents (holds, parties,
//! locations, execution results, payloads) live in `jsonb` columns.
//!
//! The schema is managed outside this crate; each store documents the columns
//! it expects.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Other | N/A | `Storage` |

mod accounts;
mod actions;
mod tasks;
mod transactions;

pub use accounts::PostgresAccountStore;
pub use actions::PostgresActionStore;
pub use tasks::PostgresTaskStore;
pub use transactions::PostgresTransactionStore;

use core::str::FromStr;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::StoreError;

/// Open a connection pool for `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code == "23505" => StoreError::Duplicate(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(column: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Storage(format!("failed to decode column {}: {}", column, err))
}

/// Read a text column holding one of the string-backed domain enums.
fn get_enum<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(|e| decode_error(column, e))?;
    raw.parse().map_err(|e| decode_error(column, e))
}

/// Read a `jsonb` column into a typed value.
fn get_json<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    let value: sqlx::types::Json<T> = row.try_get(column).map_err(|e| decode_error(column, e))?;
    Ok(value.0)
}

/// Read a nullable `jsonb` column into a typed value.
fn get_json_opt<T>(row: &PgRow, column: &str) -> Result<Option<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    let value: Option<sqlx::types::Json<T>> =
        row.try_get(column).map_err(|e| decode_error(column, e))?;
    Ok(value.map(|json| json.0))
}

fn get_column<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| decode_error(column, e))
}

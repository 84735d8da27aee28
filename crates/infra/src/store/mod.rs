//! Persistence seams for accounts, transactions, actions and tasks.
//!
//! Every state-changing call is a single-record atomic conditional write that
//! reports [`WriteOutcome::NoMatch`] instead of failing when its condition
//! misses. Services re-read and classify.
//!
//! ## Implementations
//!
//! - [`in_memory`]: lock-guarded maps for tests/dev
//! - [`postgres`]: `UPDATE ... WHERE <condition> RETURNING` on PostgreSQL

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forgepay_accounting::{Account, AccountSearchConditions, HoldResolution, PendingTransaction};
use forgepay_core::{AccountNumber, ActionId, DomainError, TaskId, TransactionId, WriteOutcome};
use forgepay_tasks::{ExecutionResult, Task, TaskName};
use forgepay_transactions::{
    Action, ActionStatus, ActionType, ExpireConditions, PotentialActions, Transaction,
    TransactionSearchConditions, TransactionStatus, TransactionType,
};

pub use in_memory::{
    InMemoryAccountStore, InMemoryActionStore, InMemoryTaskStore, InMemoryTransactionStore,
};
pub use postgres::{
    PostgresAccountStore, PostgresActionStore, PostgresTaskStore, PostgresTransactionStore,
};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Insert hit an existing key.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(key) => DomainError::already_in_use("record", [key]),
            StoreError::Storage(msg) => DomainError::storage(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: Account) -> StoreResult<Account>;

    async fn get(&self, account_number: &AccountNumber) -> StoreResult<Option<Account>>;

    /// Close if `Opened` with no holds.
    async fn close_if_idle(
        &self,
        account_number: &AccountNumber,
        close_date: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Account>>;

    /// Reserve `hold.amount` and append the hold if `Opened` and the available
    /// balance covers it.
    async fn authorize(
        &self,
        account_number: &AccountNumber,
        hold: PendingTransaction,
    ) -> StoreResult<WriteOutcome<Account>>;

    /// Append the hold if `Opened`.
    async fn start_pending(
        &self,
        account_number: &AccountNumber,
        hold: PendingTransaction,
    ) -> StoreResult<WriteOutcome<Account>>;

    /// Apply `resolution` and remove the hold if the hold is present.
    async fn resolve_hold(
        &self,
        account_number: &AccountNumber,
        transaction_id: &TransactionId,
        resolution: HoldResolution,
        amount: i64,
    ) -> StoreResult<WriteOutcome<Account>>;

    /// Matching accounts ordered by account number.
    async fn search(&self, conditions: &AccountSearchConditions) -> StoreResult<Vec<Account>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, transaction: Transaction) -> StoreResult<Transaction>;

    async fn get(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> StoreResult<Option<Transaction>>;

    /// `InProgress` → `Confirmed`, storing result and potential actions.
    async fn confirm_if_in_progress(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        result: serde_json::Value,
        potential_actions: Option<PotentialActions>,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>>;

    /// `InProgress` → `Canceled`.
    async fn cancel_if_in_progress(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>>;

    /// Every `InProgress` transaction with `expires < now` → `Expired`.
    /// Returns the number of transactions expired.
    async fn expire_overdue(
        &self,
        conditions: &ExpireConditions,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Claim the least recently updated `Unexported` transaction in `status`
    /// by moving it to `Exporting`.
    async fn claim_for_export(
        &self,
        type_of: Option<TransactionType>,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>>;

    async fn mark_exported(
        &self,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>>;

    /// `Exporting` since before `before` → `Unexported`.
    async fn reset_stale_exports(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Matching transactions ordered by start date.
    async fn search(
        &self,
        conditions: &TransactionSearchConditions,
    ) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn insert(&self, action: Action) -> StoreResult<Action>;

    async fn get(&self, type_of: ActionType, id: &ActionId) -> StoreResult<Option<Action>>;

    /// `Active` → `status`, keeping existing result/error when `None`.
    async fn finish_if_active(
        &self,
        type_of: ActionType,
        id: &ActionId,
        status: ActionStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Action>>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> StoreResult<Task>;

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Claim the due `Ready` task named `name` with the earliest `runs_at`.
    async fn claim_next(&self, name: TaskName, now: DateTime<Utc>) -> StoreResult<Option<Task>>;

    /// Append `result` to a `Running` task; a success also moves it to
    /// `Executed`.
    async fn record_execution(
        &self,
        id: &TaskId,
        result: ExecutionResult,
    ) -> StoreResult<WriteOutcome<Task>>;

    /// Stale `Running` tasks with tries left → `Ready`.
    async fn reset_stale(&self, before: DateTime<Utc>) -> StoreResult<u64>;

    /// One stale `Running` task with no tries left → `Aborted`.
    async fn abort_one(&self, before: DateTime<Utc>) -> StoreResult<Option<Task>>;
}

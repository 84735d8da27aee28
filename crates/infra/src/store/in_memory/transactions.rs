use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forgepay_core::{TransactionId, WriteOutcome};
use forgepay_transactions::{
    ExpireConditions, PotentialActions, TasksExportationStatus, Transaction,
    TransactionSearchConditions, TransactionStatus, TransactionType,
};

use super::Collection;
use crate::store::{StoreResult, TransactionStore};

/// In-memory transaction store.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: Collection<Transaction>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, transaction: Transaction) -> StoreResult<Transaction> {
        self.transactions.insert(transaction)
    }

    async fn get(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .get(id)?
            .filter(|transaction| transaction.type_of == type_of))
    }

    async fn confirm_if_in_progress(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        result: serde_json::Value,
        potential_actions: Option<PotentialActions>,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>> {
        self.transactions.find_one_and_update(
            id,
            |tx| tx.type_of == type_of && tx.status == TransactionStatus::InProgress,
            |tx| {
                tx.status = TransactionStatus::Confirmed;
                tx.result = Some(result);
                tx.potential_actions = potential_actions;
                tx.end_date = Some(now);
                tx.updated_at = now;
            },
        )
    }

    async fn cancel_if_in_progress(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>> {
        self.transactions.find_one_and_update(
            id,
            |tx| tx.type_of == type_of && tx.status == TransactionStatus::InProgress,
            |tx| {
                tx.status = TransactionStatus::Canceled;
                tx.end_date = Some(now);
                tx.updated_at = now;
            },
        )
    }

    async fn expire_overdue(
        &self,
        conditions: &ExpireConditions,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.transactions.update_many(
            |tx| tx.is_overdue(now) && conditions.type_of.map_or(true, |t| tx.type_of == t),
            |tx| {
                tx.status = TransactionStatus::Expired;
                tx.end_date = Some(now);
                tx.updated_at = now;
            },
        )
    }

    async fn claim_for_export(
        &self,
        type_of: Option<TransactionType>,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        self.transactions.find_first_and_update(
            |tx| {
                tx.status == status
                    && tx.tasks_exportation_status == TasksExportationStatus::Unexported
                    && type_of.map_or(true, |t| tx.type_of == t)
            },
            |tx| (tx.updated_at, tx.id),
            |tx| {
                tx.tasks_exportation_status = TasksExportationStatus::Exporting;
                tx.updated_at = now;
            },
        )
    }

    async fn mark_exported(
        &self,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Transaction>> {
        self.transactions.find_one_and_update(
            id,
            |_| true,
            |tx| {
                tx.tasks_exportation_status = TasksExportationStatus::Exported;
                tx.tasks_exported_at = Some(now);
                tx.updated_at = now;
            },
        )
    }

    async fn reset_stale_exports(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.transactions.update_many(
            |tx| {
                tx.tasks_exportation_status == TasksExportationStatus::Exporting
                    && tx.updated_at < before
            },
            |tx| {
                tx.tasks_exportation_status = TasksExportationStatus::Unexported;
                tx.updated_at = now;
            },
        )
    }

    async fn search(
        &self,
        conditions: &TransactionSearchConditions,
    ) -> StoreResult<Vec<Transaction>> {
        self.transactions.query(
            |tx| conditions.matches(tx),
            |tx| (tx.start_date, tx.id),
            conditions.limit,
        )
    }
}

//! Transaction state machine.
//!
//! `InProgress` moves to exactly one of `Confirmed`, `Expired` or `Canceled`
//! and never changes again. Export bookkeeping (`Unexported` → `Exporting` →
//! `Exported`) runs independently once the status is terminal.

use std::sync::Arc;

use forgepay_core::{Clock, DomainError, DomainResult, TransactionId, WriteOutcome};
use forgepay_observability::record_outcome;
use forgepay_tasks::stale_before;
use forgepay_transactions::{
    classify_cancel_miss, classify_confirm_miss, ExpireConditions, PotentialActions, Transaction,
    TransactionAttributes, TransactionSearchConditions, TransactionStatus, TransactionType,
};

use crate::store::TransactionStore;

#[derive(Clone)]
pub struct TransactionMachine {
    store: Arc<dyn TransactionStore>,
    clock: Arc<dyn Clock>,
}

impl TransactionMachine {
    pub fn new(store: Arc<dyn TransactionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn start(
        &self,
        type_of: TransactionType,
        attributes: TransactionAttributes,
    ) -> DomainResult<Transaction> {
        let transaction =
            Transaction::new(TransactionId::new(), type_of, attributes, self.clock.now());
        let id = transaction.id;
        let result = self.store.insert(transaction).await.map_err(DomainError::from);
        record_outcome("start", &id, &result);
        result
    }

    pub async fn find_by_id(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> DomainResult<Transaction> {
        self.store
            .get(type_of, id)
            .await?
            .ok_or_else(|| DomainError::not_found("Transaction"))
    }

    /// Confirming an already confirmed transaction returns it unchanged.
    pub async fn confirm(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
        result: serde_json::Value,
        potential_actions: Option<PotentialActions>,
    ) -> DomainResult<Transaction> {
        let now = self.clock.now();
        let outcome: DomainResult<Transaction> = async {
            match self
                .store
                .confirm_if_in_progress(type_of, id, result, potential_actions, now)
                .await?
            {
                WriteOutcome::Applied(transaction) => Ok(transaction),
                WriteOutcome::NoMatch => classify_confirm_miss(self.store.get(type_of, id).await?),
            }
        }
        .await;
        record_outcome("confirm", id, &outcome);
        outcome
    }

    /// Canceling an already canceled transaction returns it unchanged.
    pub async fn cancel(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> DomainResult<Transaction> {
        let now = self.clock.now();
        let outcome: DomainResult<Transaction> = async {
            match self.store.cancel_if_in_progress(type_of, id, now).await? {
                WriteOutcome::Applied(transaction) => Ok(transaction),
                WriteOutcome::NoMatch => classify_cancel_miss(self.store.get(type_of, id).await?),
            }
        }
        .await;
        record_outcome("cancel", id, &outcome);
        outcome
    }

    /// Expire every overdue `InProgress` transaction. Returns how many moved.
    pub async fn make_expired(&self, conditions: &ExpireConditions) -> DomainResult<u64> {
        let expired = self.store.expire_overdue(conditions, self.clock.now()).await?;
        if expired > 0 {
            tracing::info!(operation = "make_expired", expired, "transactions expired");
        }
        Ok(expired)
    }

    /// Claim one terminal transaction in `status` whose tasks are not yet
    /// exported.
    pub async fn start_export_tasks(
        &self,
        type_of: Option<TransactionType>,
        status: TransactionStatus,
    ) -> DomainResult<Option<Transaction>> {
        if !status.is_terminal() {
            return Err(DomainError::argument(
                "status",
                "only terminal transactions export tasks",
            ));
        }
        let claimed = self
            .store
            .claim_for_export(type_of, status, self.clock.now())
            .await?;
        if let Some(transaction) = &claimed {
            tracing::debug!(
                operation = "start_export_tasks",
                transaction_id = %transaction.id,
                status = %status,
                "claimed transaction for export"
            );
        }
        Ok(claimed)
    }

    pub async fn set_tasks_exported_by_id(&self, id: &TransactionId) -> DomainResult<Transaction> {
        let result = match self.store.mark_exported(id, self.clock.now()).await {
            Ok(WriteOutcome::Applied(transaction)) => Ok(transaction),
            Ok(WriteOutcome::NoMatch) => Err(DomainError::not_found("Transaction")),
            Err(err) => Err(err.into()),
        };
        record_outcome("set_tasks_exported_by_id", id, &result);
        result
    }

    /// Return transactions stuck in `Exporting` for longer than the interval
    /// to `Unexported` so a later export picks them up again.
    pub async fn reexport_tasks(&self, interval_in_minutes: i64) -> DomainResult<u64> {
        let now = self.clock.now();
        let reset = self
            .store
            .reset_stale_exports(stale_before(now, interval_in_minutes), now)
            .await?;
        if reset > 0 {
            tracing::warn!(operation = "reexport_tasks", reset, "stale exports reset");
        }
        Ok(reset)
    }

    pub async fn search(
        &self,
        conditions: &TransactionSearchConditions,
    ) -> DomainResult<Vec<Transaction>> {
        Ok(self.store.search(conditions).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use forgepay_core::{AccountNumber, ManualClock};
    use forgepay_transactions::{Participant, TasksExportationStatus, TransactionObject};

    use crate::store::InMemoryTransactionStore;

    fn machine() -> (TransactionMachine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let machine = TransactionMachine::new(Arc::new(InMemoryTransactionStore::new()), clock.clone());
        (machine, clock)
    }

    fn deposit(expires_in: Duration, clock: &ManualClock) -> TransactionAttributes {
        TransactionAttributes {
            agent: Participant::person("p-1", "Alice"),
            recipient: Participant::person("p-2", "Bob"),
            object: TransactionObject {
                amount: 100,
                from_account_number: None,
                to_account_number: Some(AccountNumber::new("B").unwrap()),
                notes: String::new(),
            },
            expires: clock.now() + expires_in,
        }
    }

    #[tokio::test]
    async fn confirm_twice_returns_the_confirmed_transaction() {
        let (machine, clock) = machine();
        let tx = machine
            .start(TransactionType::Deposit, deposit(Duration::minutes(5), &clock))
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::InProgress);
        assert_eq!(tx.tasks_exportation_status, TasksExportationStatus::Unexported);

        let first = machine
            .confirm(TransactionType::Deposit, &tx.id, serde_json::json!({}), None)
            .await
            .unwrap();
        let second = machine
            .confirm(TransactionType::Deposit, &tx.id, serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(first.status, TransactionStatus::Confirmed);
        assert_eq!(first, second);

        let err = machine.cancel(TransactionType::Deposit, &tx.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Argument { .. }));
    }

    #[tokio::test]
    async fn confirm_after_expiry_is_rejected() {
        let (machine, clock) = machine();
        let tx = machine
            .start(TransactionType::Deposit, deposit(Duration::minutes(1), &clock))
            .await
            .unwrap();

        clock.advance(Duration::minutes(2));
        assert_eq!(machine.make_expired(&ExpireConditions::default()).await.unwrap(), 1);
        assert_eq!(machine.make_expired(&ExpireConditions::default()).await.unwrap(), 0);

        let err = machine
            .confirm(TransactionType::Deposit, &tx.id, serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Argument { .. }));
    }

    #[tokio::test]
    async fn lookups_are_scoped_by_type() {
        let (machine, clock) = machine();
        let tx = machine
            .start(TransactionType::Deposit, deposit(Duration::minutes(5), &clock))
            .await
            .unwrap();

        let err = machine
            .cancel(TransactionType::Withdraw, &tx.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let canceled = machine.cancel(TransactionType::Deposit, &tx.id).await.unwrap();
        let again = machine.cancel(TransactionType::Deposit, &tx.id).await.unwrap();
        assert_eq!(canceled, again);
    }

    #[tokio::test]
    async fn export_claim_and_reexport() {
        let (machine, clock) = machine();
        let tx = machine
            .start(TransactionType::Deposit, deposit(Duration::minutes(5), &clock))
            .await
            .unwrap();
        machine.cancel(TransactionType::Deposit, &tx.id).await.unwrap();

        assert!(machine
            .start_export_tasks(None, TransactionStatus::Confirmed)
            .await
            .unwrap()
            .is_none());

        let claimed = machine
            .start_export_tasks(Some(TransactionType::Deposit), TransactionStatus::Canceled)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.tasks_exportation_status, TasksExportationStatus::Exporting);
        assert!(machine
            .start_export_tasks(None, TransactionStatus::Canceled)
            .await
            .unwrap()
            .is_none());

        clock.advance(Duration::minutes(11));
        assert_eq!(machine.reexport_tasks(10).await.unwrap(), 1);

        let reclaimed = machine
            .start_export_tasks(None, TransactionStatus::Canceled)
            .await
            .unwrap()
            .unwrap();
        let exported = machine.set_tasks_exported_by_id(&reclaimed.id).await.unwrap();
        assert_eq!(exported.tasks_exportation_status, TasksExportationStatus::Exported);
        assert_eq!(exported.tasks_exported_at, Some(clock.now()));

        assert!(matches!(
            machine.start_export_tasks(None, TransactionStatus::InProgress).await,
            Err(DomainError::Argument { .. })
        ));
    }

    #[tokio::test]
    async fn search_filters_by_window_and_status() {
        let (machine, clock) = machine();
        let from = clock.now();
        let first = machine
            .start(TransactionType::Deposit, deposit(Duration::minutes(5), &clock))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        machine
            .start(TransactionType::Deposit, deposit(Duration::minutes(5), &clock))
            .await
            .unwrap();
        machine.cancel(TransactionType::Deposit, &first.id).await.unwrap();

        let found = machine
            .search(&TransactionSearchConditions {
                type_of: TransactionType::Deposit,
                start_from: from,
                start_through: clock.now(),
                statuses: Some(vec![TransactionStatus::InProgress]),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_ne!(found[0].id, first.id);
    }
}

//! Money-transfer saga.
//!
//! Brackets a settlement (or void) of a transaction's holds in the action log.
//! Each ledger leg is an independent idempotent write, so the task queue can
//! redrive a step that was interrupted halfway.

use forgepay_accounting::HoldRelease;
use forgepay_core::{DomainError, DomainResult};
use forgepay_transactions::{Action, ActionType, MoneyTransferActionAttributes, TransactionRef};
use tracing::{error, info};

use crate::services::{AccountLedger, ActionLog, TransactionMachine};

#[derive(Clone)]
pub struct MoneyTransferSaga {
    ledger: AccountLedger,
    transactions: TransactionMachine,
    actions: ActionLog,
}

fn error_document(err: &DomainError) -> serde_json::Value {
    serde_json::json!({
        "kind": err.kind(),
        "message": err.to_string(),
    })
}

impl MoneyTransferSaga {
    pub fn new(ledger: AccountLedger, transactions: TransactionMachine, actions: ActionLog) -> Self {
        Self {
            ledger,
            transactions,
            actions,
        }
    }

    /// Settle the holds of the transaction named by `attributes.purpose`.
    ///
    /// On failure the action is marked `Failed` on a best-effort basis and the
    /// original error is returned.
    pub async fn transfer_money(
        &self,
        attributes: MoneyTransferActionAttributes,
    ) -> DomainResult<Action> {
        let action = self.actions.start(attributes.clone()).await?;

        if let Err(err) = self.settle(&attributes).await {
            if let Err(give_up_err) = self
                .actions
                .give_up(ActionType::MoneyTransfer, &action.id, error_document(&err))
                .await
            {
                error!(
                    action_id = %action.id,
                    transaction_id = %attributes.purpose.id,
                    error = %give_up_err,
                    original_error = %err,
                    "failed to record money transfer failure"
                );
            }
            return Err(err);
        }

        let completed = self
            .actions
            .complete(ActionType::MoneyTransfer, &action.id, serde_json::json!({}))
            .await?;
        info!(
            action_id = %completed.id,
            transaction_id = %attributes.purpose.id,
            amount = attributes.amount,
            "money transferred"
        );
        Ok(completed)
    }

    async fn settle(&self, attributes: &MoneyTransferActionAttributes) -> DomainResult<()> {
        let purpose = attributes.purpose;
        let transaction = self
            .transactions
            .find_by_id(purpose.type_of, &purpose.id)
            .await?;

        let release = HoldRelease {
            from_account_number: attributes.from_location.account_number().cloned(),
            to_account_number: attributes.to_location.account_number().cloned(),
            amount: attributes.amount,
            transaction_id: transaction.id,
        };
        self.ledger.settle_transaction(&release).await
    }

    /// Void the holds placed for `transaction`: the destination for a deposit,
    /// the source for a withdrawal, both for a transfer.
    pub async fn cancel_money_transfer(&self, transaction: TransactionRef) -> DomainResult<()> {
        let transaction = self
            .transactions
            .find_by_id(transaction.type_of, &transaction.id)
            .await?;
        let (from, to) = transaction.settlement_accounts()?;

        let release = HoldRelease {
            from_account_number: from.cloned(),
            to_account_number: to.cloned(),
            amount: transaction.object.amount,
            transaction_id: transaction.id,
        };
        self.ledger.void_transaction(&release).await?;
        info!(
            transaction_id = %transaction.id,
            type_of = %transaction.type_of,
            "money transfer canceled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use forgepay_core::{AccountNumber, ActionId, ManualClock, WriteOutcome};
    use forgepay_transactions::{
        ActionStatus, Participant, Transaction, TransactionAttributes, TransactionObject,
        TransactionType,
    };

    use super::*;
    use crate::store::{
        ActionStore, InMemoryAccountStore, InMemoryActionStore, InMemoryTransactionStore,
        StoreError, StoreResult,
    };

    /// Remembers inserted action ids and can fail the terminal write.
    #[derive(Default)]
    struct RecordingActionStore {
        inner: InMemoryActionStore,
        inserted: Mutex<Vec<ActionId>>,
        fail_finish: AtomicBool,
    }

    #[async_trait]
    impl ActionStore for RecordingActionStore {
        async fn insert(&self, action: Action) -> StoreResult<Action> {
            self.inserted.lock().unwrap().push(action.id);
            self.inner.insert(action).await
        }

        async fn get(&self, type_of: ActionType, id: &ActionId) -> StoreResult<Option<Action>> {
            self.inner.get(type_of, id).await
        }

        async fn finish_if_active(
            &self,
            type_of: ActionType,
            id: &ActionId,
            status: ActionStatus,
            result: Option<serde_json::Value>,
            error: Option<serde_json::Value>,
            now: DateTime<Utc>,
        ) -> StoreResult<WriteOutcome<Action>> {
            if self.fail_finish.load(Ordering::SeqCst) {
                return Err(StoreError::Storage("action store down".into()));
            }
            self.inner
                .finish_if_active(type_of, id, status, result, error, now)
                .await
        }
    }

    struct Fixture {
        saga: MoneyTransferSaga,
        ledger: AccountLedger,
        transactions: TransactionMachine,
        actions: ActionLog,
        store: Arc<RecordingActionStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(RecordingActionStore::default());
        let ledger = AccountLedger::new(Arc::new(InMemoryAccountStore::new()));
        let transactions =
            TransactionMachine::new(Arc::new(InMemoryTransactionStore::new()), clock.clone());
        let actions = ActionLog::new(store.clone(), clock);
        Fixture {
            saga: MoneyTransferSaga::new(ledger.clone(), transactions.clone(), actions.clone()),
            ledger,
            transactions,
            actions,
            store,
        }
    }

    fn number(n: &str) -> AccountNumber {
        AccountNumber::new(n).unwrap()
    }

    async fn held_transfer(f: &Fixture, amount: i64) -> Transaction {
        f.ledger.open(number("A"), "Alice", 1000, Utc::now()).await.unwrap();
        f.ledger.open(number("B"), "Bob", 0, Utc::now()).await.unwrap();
        let tx = f
            .transactions
            .start(
                TransactionType::Transfer,
                TransactionAttributes {
                    agent: Participant::person("p-1", "Alice"),
                    recipient: Participant::person("p-2", "Bob"),
                    object: TransactionObject {
                        amount,
                        from_account_number: Some(number("A")),
                        to_account_number: Some(number("B")),
                        notes: String::new(),
                    },
                    expires: Utc::now() + Duration::minutes(5),
                },
            )
            .await
            .unwrap();
        f.ledger
            .authorize_amount(&number("A"), amount, tx.reference())
            .await
            .unwrap();
        f.ledger
            .start_transaction(&number("B"), amount, tx.reference())
            .await
            .unwrap();
        tx
    }

    #[tokio::test]
    async fn transfer_settles_both_legs_and_completes() {
        let f = fixture();
        let tx = held_transfer(&f, 400).await;

        let action = f
            .saga
            .transfer_money(tx.money_transfer_action().unwrap())
            .await
            .unwrap();
        assert_eq!(action.action_status, ActionStatus::Completed);
        assert_eq!(action.result, Some(serde_json::json!({})));

        let a = f.ledger.find_by_account_number(&number("A")).await.unwrap();
        let b = f.ledger.find_by_account_number(&number("B")).await.unwrap();
        assert_eq!((a.balance, a.available_balance), (600, 600));
        assert_eq!((b.balance, b.available_balance), (400, 400));

        // Redrive: a second action, no double settlement.
        f.saga
            .transfer_money(tx.money_transfer_action().unwrap())
            .await
            .unwrap();
        let a = f.ledger.find_by_account_number(&number("A")).await.unwrap();
        assert_eq!(a.balance, 600);
    }

    #[tokio::test]
    async fn redrive_after_partial_settlement_credits_the_remaining_leg() {
        let f = fixture();
        let tx = held_transfer(&f, 400).await;
        f.ledger
            .settle_transaction(&HoldRelease {
                from_account_number: Some(number("A")),
                to_account_number: None,
                amount: 400,
                transaction_id: tx.id,
            })
            .await
            .unwrap();

        let action = f
            .saga
            .transfer_money(tx.money_transfer_action().unwrap())
            .await
            .unwrap();
        assert_eq!(action.action_status, ActionStatus::Completed);

        let a = f.ledger.find_by_account_number(&number("A")).await.unwrap();
        let b = f.ledger.find_by_account_number(&number("B")).await.unwrap();
        assert_eq!((a.balance, a.available_balance), (600, 600));
        assert_eq!((b.balance, b.available_balance), (400, 400));
        assert!(a.pending_transactions.is_empty() && b.pending_transactions.is_empty());
    }

    #[tokio::test]
    async fn missing_transaction_fails_the_action() {
        let f = fixture();
        let tx = held_transfer(&f, 100).await;
        let mut attributes = tx.money_transfer_action().unwrap();
        attributes.purpose.id = forgepay_core::TransactionId::new();

        let err = f.saga.transfer_money(attributes).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let id = *f.store.inserted.lock().unwrap().last().unwrap();
        let action = f.actions.find_by_id(ActionType::MoneyTransfer, &id).await.unwrap();
        assert_eq!(action.action_status, ActionStatus::Failed);
        assert_eq!(action.error.unwrap()["kind"], "not_found");
    }

    #[tokio::test]
    async fn give_up_failure_keeps_original_error() {
        let f = fixture();
        let tx = held_transfer(&f, 100).await;
        let mut attributes = tx.money_transfer_action().unwrap();
        attributes.purpose.id = forgepay_core::TransactionId::new();
        f.store.fail_finish.store(true, Ordering::SeqCst);

        let err = f.saga.transfer_money(attributes).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_voids_holds_per_type() {
        let f = fixture();
        let tx = held_transfer(&f, 250).await;

        f.saga.cancel_money_transfer(tx.reference()).await.unwrap();
        f.saga.cancel_money_transfer(tx.reference()).await.unwrap();

        let a = f.ledger.find_by_account_number(&number("A")).await.unwrap();
        let b = f.ledger.find_by_account_number(&number("B")).await.unwrap();
        assert_eq!((a.balance, a.available_balance), (1000, 1000));
        assert_eq!((b.balance, b.available_balance), (0, 0));
        assert!(a.pending_transactions.is_empty() && b.pending_transactions.is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_transaction_is_not_found() {
        let f = fixture();
        let err = f
            .saga
            .cancel_money_transfer(TransactionRef {
                type_of: TransactionType::Deposit,
                id: forgepay_core::TransactionId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}

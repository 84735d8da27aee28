//! Action log: audit trail of performed actions.

use std::sync::Arc;

use forgepay_core::{ActionId, Clock, DomainError, DomainResult, WriteOutcome};
use forgepay_observability::record_outcome;
use forgepay_transactions::{Action, ActionStatus, ActionType, MoneyTransferActionAttributes};

use crate::store::ActionStore;

#[derive(Clone)]
pub struct ActionLog {
    store: Arc<dyn ActionStore>,
    clock: Arc<dyn Clock>,
}

impl ActionLog {
    pub fn new(store: Arc<dyn ActionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a new `Active` money-transfer action.
    pub async fn start(&self, attributes: MoneyTransferActionAttributes) -> DomainResult<Action> {
        let action = Action::money_transfer(ActionId::new(), attributes, self.clock.now());
        let id = action.id;
        let result = self.store.insert(action).await.map_err(DomainError::from);
        record_outcome("action_start", &id, &result);
        result
    }

    pub async fn complete(
        &self,
        type_of: ActionType,
        id: &ActionId,
        result: serde_json::Value,
    ) -> DomainResult<Action> {
        self.finish("action_complete", type_of, id, ActionStatus::Completed, Some(result), None)
            .await
    }

    pub async fn cancel(&self, type_of: ActionType, id: &ActionId) -> DomainResult<Action> {
        self.finish("action_cancel", type_of, id, ActionStatus::Canceled, None, None)
            .await
    }

    /// Mark the action `Failed`, keeping `error` for the audit trail.
    pub async fn give_up(
        &self,
        type_of: ActionType,
        id: &ActionId,
        error: serde_json::Value,
    ) -> DomainResult<Action> {
        self.finish("action_give_up", type_of, id, ActionStatus::Failed, None, Some(error))
            .await
    }

    pub async fn find_by_id(&self, type_of: ActionType, id: &ActionId) -> DomainResult<Action> {
        self.store
            .get(type_of, id)
            .await?
            .ok_or_else(|| DomainError::not_found("Action"))
    }

    async fn finish(
        &self,
        operation: &'static str,
        type_of: ActionType,
        id: &ActionId,
        status: ActionStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> DomainResult<Action> {
        let outcome = match self
            .store
            .finish_if_active(type_of, id, status, result, error, self.clock.now())
            .await
        {
            Ok(WriteOutcome::Applied(action)) => Ok(action),
            Ok(WriteOutcome::NoMatch) => Err(DomainError::not_found("Action")),
            Err(err) => Err(err.into()),
        };
        record_outcome(operation, id, &outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forgepay_core::{AccountNumber, ManualClock, TransactionId};
    use forgepay_transactions::{Location, Participant, TransactionRef, TransactionType};

    use crate::store::InMemoryActionStore;

    fn log() -> ActionLog {
        ActionLog::new(
            Arc::new(InMemoryActionStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn attributes() -> MoneyTransferActionAttributes {
        MoneyTransferActionAttributes {
            agent: Participant::person("p-1", "Alice"),
            recipient: Participant::person("p-2", "Bob"),
            amount: 40,
            from_location: Location::Account {
                account_number: AccountNumber::new("A").unwrap(),
                name: "Alice".into(),
            },
            to_location: Location::Account {
                account_number: AccountNumber::new("B").unwrap(),
                name: "Bob".into(),
            },
            purpose: TransactionRef {
                type_of: TransactionType::Transfer,
                id: TransactionId::new(),
            },
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn complete_then_give_up_is_not_found() {
        let log = log();
        let action = log.start(attributes()).await.unwrap();
        assert_eq!(action.action_status, ActionStatus::Active);

        let done = log
            .complete(ActionType::MoneyTransfer, &action.id, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(done.action_status, ActionStatus::Completed);
        assert!(done.end_date.is_some());

        let err = log
            .give_up(ActionType::MoneyTransfer, &action.id, serde_json::json!("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let stored = log.find_by_id(ActionType::MoneyTransfer, &action.id).await.unwrap();
        assert_eq!(stored.action_status, ActionStatus::Completed);
    }

    #[tokio::test]
    async fn give_up_records_error() {
        let log = log();
        let action = log.start(attributes()).await.unwrap();
        let failed = log
            .give_up(
                ActionType::MoneyTransfer,
                &action.id,
                serde_json::json!({ "message": "boom" }),
            )
            .await
            .unwrap();
        assert_eq!(failed.action_status, ActionStatus::Failed);
        assert_eq!(failed.error, Some(serde_json::json!({ "message": "boom" })));

        let err = log.cancel(ActionType::MoneyTransfer, &action.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let err = log
            .find_by_id(ActionType::MoneyTransfer, &ActionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}

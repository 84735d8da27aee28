use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forgepay_core::{ActionId, WriteOutcome};
use forgepay_transactions::{Action, ActionStatus, ActionType};

use super::Collection;
use crate::store::{ActionStore, StoreResult};

/// In-memory action store.
#[derive(Debug, Default)]
pub struct InMemoryActionStore {
    actions: Collection<Action>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn insert(&self, action: Action) -> StoreResult<Action> {
        self.actions.insert(action)
    }

    async fn get(&self, type_of: ActionType, id: &ActionId) -> StoreResult<Option<Action>> {
        Ok(self.actions.get(id)?.filter(|action| action.type_of == type_of))
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
        self.actions.find_one_and_update(
            id,
            |action| action.type_of == type_of && action.action_status == ActionStatus::Active,
            |action| {
                action.finish(status, result, error, now);
            },
        )
    }
}

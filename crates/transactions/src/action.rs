//! Action log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgepay_core::{ActionId, Entity};

use crate::participant::{Location, Participant};
use crate::transaction::TransactionRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    MoneyTransfer,
}

forgepay_core::string_enum!(ActionType, "typeOf", [MoneyTransfer]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    Active,
    Completed,
    Canceled,
    Failed,
}

forgepay_core::string_enum!(ActionStatus, "actionStatus", [Active, Completed, Canceled, Failed]);

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Everything needed to run (and audit) one money transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyTransferActionAttributes {
    pub agent: Participant,
    pub recipient: Participant,
    pub amount: i64,
    pub from_location: Location,
    pub to_location: Location,
    /// The transaction this transfer carries out.
    pub purpose: TransactionRef,
    #[serde(default)]
    pub notes: String,
}

/// What a money-transfer action moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyTransferObject {
    pub amount: i64,
    pub from_location: Location,
    pub to_location: Location,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub type_of: ActionType,
    pub action_status: ActionStatus,
    pub agent: Participant,
    pub recipient: Participant,
    pub object: MoneyTransferObject,
    pub purpose: TransactionRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Entity for Action {
    type Id = ActionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Action {
    /// A new `Active` money-transfer action.
    pub fn money_transfer(
        id: ActionId,
        attributes: MoneyTransferActionAttributes,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            type_of: ActionType::MoneyTransfer,
            action_status: ActionStatus::Active,
            agent: attributes.agent,
            recipient: attributes.recipient,
            object: MoneyTransferObject {
                amount: attributes.amount,
                from_location: attributes.from_location,
                to_location: attributes.to_location,
                notes: attributes.notes,
            },
            purpose: attributes.purpose,
            result: None,
            error: None,
            start_date: now,
            end_date: None,
        }
    }

    /// Moves an `Active` action to `status`, stamping `end_date`.
    ///
    /// Returns `false` (and leaves the action untouched) if it is no longer
    /// active.
    pub fn finish(
        &mut self,
        status: ActionStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.action_status != ActionStatus::Active {
            return false;
        }
        self.action_status = status;
        if result.is_some() {
            self.result = result;
        }
        if error.is_some() {
            self.error = error;
        }
        self.end_date = Some(now);
        true
    }
}

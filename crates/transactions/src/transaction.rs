//! Money-movement transactions and their lifecycle rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgepay_core::{AccountNumber, DomainError, DomainResult, Entity, TransactionId};

use crate::action::MoneyTransferActionAttributes;
use crate::participant::{Location, Participant};

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Money enters the system into a destination account.
    Deposit,
    /// Money leaves the system from a source account.
    Withdraw,
    /// Money moves from a source account to a destination account.
    Transfer,
}

forgepay_core::string_enum!(TransactionType, "typeOf", [Deposit, Withdraw, Transfer]);

impl TransactionType {
    pub fn debits_source(&self) -> bool {
        matches!(self, Self::Withdraw | Self::Transfer)
    }

    pub fn credits_destination(&self) -> bool {
        matches!(self, Self::Deposit | Self::Transfer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    InProgress,
    Confirmed,
    Expired,
    Canceled,
}

forgepay_core::string_enum!(
    TransactionStatus,
    "status",
    [InProgress, Confirmed, Expired, Canceled]
);

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Progress of turning a terminal transaction into queued tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TasksExportationStatus {
    Unexported,
    Exporting,
    Exported,
}

forgepay_core::string_enum!(
    TasksExportationStatus,
    "tasksExportationStatus",
    [Unexported, Exporting, Exported]
);

/// Back-reference to a transaction: `(type_of, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRef {
    pub type_of: TransactionType,
    pub id: TransactionId,
}

/// What the transaction moves and between which accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionObject {
    /// Positive amount in minor units.
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account_number: Option<AccountNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account_number: Option<AccountNumber>,
    #[serde(default)]
    pub notes: String,
}

impl TransactionObject {
    /// Checks the amount and that exactly the accounts `type_of` needs are
    /// present.
    pub fn validate_for(&self, type_of: TransactionType) -> DomainResult<()> {
        if self.amount <= 0 {
            return Err(DomainError::argument("amount", "must be positive"));
        }
        let (from, to) = self.settlement_accounts(type_of)?;
        if let (Some(from), Some(to)) = (from, to) {
            if from == to {
                return Err(DomainError::argument(
                    "toAccountNumber",
                    "must differ from fromAccountNumber",
                ));
            }
        }
        Ok(())
    }

    /// Accounts whose holds a transaction of `type_of` touches: the source
    /// (debit side) and the destination (credit side).
    pub fn settlement_accounts(
        &self,
        type_of: TransactionType,
    ) -> DomainResult<(Option<&AccountNumber>, Option<&AccountNumber>)> {
        let from = if type_of.debits_source() {
            Some(
                self.from_account_number
                    .as_ref()
                    .ok_or_else(|| DomainError::argument("fromAccountNumber", "required"))?,
            )
        } else {
            None
        };
        let to = if type_of.credits_destination() {
            Some(
                self.to_account_number
                    .as_ref()
                    .ok_or_else(|| DomainError::argument("toAccountNumber", "required"))?,
            )
        } else {
            None
        };
        Ok((from, to))
    }
}

/// Follow-up actions recorded on a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialActions {
    pub money_transfer: MoneyTransferActionAttributes,
}

/// Caller-supplied part of a new transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttributes {
    pub agent: Participant,
    pub recipient: Participant,
    pub object: TransactionObject,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub type_of: TransactionType,
    pub status: TransactionStatus,
    pub agent: Participant,
    pub recipient: Participant,
    pub object: TransactionObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_actions: Option<PotentialActions>,
    pub expires: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub tasks_exportation_status: TasksExportationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_exported_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Transaction {
    /// A fresh `InProgress`, `Unexported` transaction.
    pub fn new(
        id: TransactionId,
        type_of: TransactionType,
        attributes: TransactionAttributes,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            type_of,
            status: TransactionStatus::InProgress,
            agent: attributes.agent,
            recipient: attributes.recipient,
            object: attributes.object,
            result: None,
            error: None,
            potential_actions: None,
            expires: attributes.expires,
            start_date: now,
            end_date: None,
            tasks_exportation_status: TasksExportationStatus::Unexported,
            tasks_exported_at: None,
            updated_at: now,
        }
    }

    pub fn reference(&self) -> TransactionRef {
        TransactionRef {
            type_of: self.type_of,
            id: self.id,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::InProgress && self.expires < now
    }

    pub fn settlement_accounts(
        &self,
    ) -> DomainResult<(Option<&AccountNumber>, Option<&AccountNumber>)> {
        self.object.settlement_accounts(self.type_of)
    }

    /// The money-transfer action that carries this transaction out once it is
    /// confirmed.
    pub fn money_transfer_action(&self) -> DomainResult<MoneyTransferActionAttributes> {
        let (from, to) = self.settlement_accounts()?;
        let from_location = match from {
            Some(account_number) => Location::Account {
                account_number: account_number.clone(),
                name: self.agent.name.clone(),
            },
            None => Location::from(&self.agent),
        };
        let to_location = match to {
            Some(account_number) => Location::Account {
                account_number: account_number.clone(),
                name: self.recipient.name.clone(),
            },
            None => Location::from(&self.recipient),
        };

        Ok(MoneyTransferActionAttributes {
            agent: self.agent.clone(),
            recipient: self.recipient.clone(),
            amount: self.object.amount,
            from_location,
            to_location,
            purpose: self.reference(),
            notes: self.object.notes.clone(),
        })
    }
}

/// Resolves a `confirm` whose conditional write matched nothing.
///
/// A confirmed transaction is returned as-is so retries are idempotent.
pub fn classify_confirm_miss(current: Option<Transaction>) -> DomainResult<Transaction> {
    let Some(current) = current else {
        return Err(DomainError::not_found("Transaction"));
    };
    match current.status {
        TransactionStatus::Confirmed => Ok(current),
        TransactionStatus::Expired => Err(DomainError::argument(
            "transactionId",
            "Transaction already expired",
        )),
        TransactionStatus::Canceled => Err(DomainError::argument(
            "transactionId",
            "Transaction already canceled",
        )),
        TransactionStatus::InProgress => Err(DomainError::unavailable(
            "transaction still in progress after a missed confirm",
        )),
    }
}

/// Resolves a `cancel` whose conditional write matched nothing.
pub fn classify_cancel_miss(current: Option<Transaction>) -> DomainResult<Transaction> {
    let Some(current) = current else {
        return Err(DomainError::not_found("Transaction"));
    };
    match current.status {
        TransactionStatus::Canceled => Ok(current),
        TransactionStatus::Expired => Err(DomainError::argument(
            "transactionId",
            "Transaction already expired",
        )),
        TransactionStatus::Confirmed => Err(DomainError::argument(
            "transactionId",
            "Transaction already confirmed",
        )),
        TransactionStatus::InProgress => Err(DomainError::unavailable(
            "transaction still in progress after a missed cancel",
        )),
    }
}

/// Filter for the bulk expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireConditions {
    /// Restrict the sweep to one transaction type.
    #[serde(default)]
    pub type_of: Option<TransactionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSearchConditions {
    pub type_of: TransactionType,
    pub start_from: DateTime<Utc>,
    pub start_through: DateTime<Utc>,
    #[serde(default)]
    pub statuses: Option<Vec<TransactionStatus>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TransactionSearchConditions {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction.type_of == self.type_of
            && transaction.start_date >= self.start_from
            && transaction.start_date <= self.start_through
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&transaction.status))
    }
}

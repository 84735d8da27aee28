//! `forgepay-transactions`: money-movement transactions and the action log
//! records that carry them out.

pub mod action;
pub mod participant;
pub mod transaction;

pub use action::{
    Action, ActionStatus, ActionType, MoneyTransferActionAttributes, MoneyTransferObject,
};
pub use participant::{Location, Participant, ParticipantType};
pub use transaction::{
    classify_cancel_miss, classify_confirm_miss, ExpireConditions, PotentialActions, TasksExportationStatus,
    Transaction, TransactionAttributes, TransactionObject, TransactionRef,
    TransactionSearchConditions, TransactionStatus, TransactionType,
};

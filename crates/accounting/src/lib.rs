//! Account ledger domain: accounts, holds and balance rules.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod account;

pub use account::{
    classify_authorize_miss, classify_close_miss, classify_start_miss, Account,
    AccountSearchConditions, AccountStatus, AccountSummary, HoldRelease, HoldResolution,
    PendingTransaction,
};

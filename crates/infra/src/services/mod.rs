//! Domain services over the stores.
//!
//! Each service method performs one conditional write, re-reads on a miss,
//! and emits one structured outcome event.

pub mod actions;
pub mod ledger;
pub mod transactions;

pub use actions::ActionLog;
pub use ledger::AccountLedger;
pub use transactions::TransactionMachine;

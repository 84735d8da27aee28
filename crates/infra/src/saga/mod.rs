//! Multi-step money movements built on the ledger, transaction machine and
//! action log.
//!
//! - [`MoneyMovement`]: starts a transaction and places its holds
//! - [`MoneyTransferSaga`]: settles or voids those holds once the transaction
//!   is terminal, recording the attempt in the action log

pub mod initiation;
pub mod money_transfer;

pub use initiation::MoneyMovement;
pub use money_transfer::MoneyTransferSaga;

//! `forgepay-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod entity;
pub mod enums;
pub mod error;
pub mod id;
pub mod outcome;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountNumber, ActionId, TaskId, TransactionId};
pub use outcome::WriteOutcome;

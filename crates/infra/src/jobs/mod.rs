//! Asynchronous task execution.
//!
//! ## Components
//!
//! - [`TaskQueue`]: enqueue, claim, execute, retry and abort
//! - [`TaskRegistry`]: closed mapping from task name to typed handler
//! - [`TaskExporter`]: turns terminal transactions into tasks
//! - [`Scheduler`]: tokio loop polling the queue and running the sweeps
//! - [`Notifier`]: operator reports for aborted tasks

pub mod export;
pub mod notifier;
pub mod queue;
pub mod registry;
pub mod worker;

pub use export::TaskExporter;
pub use notifier::{Notifier, TracingNotifier};
pub use queue::TaskQueue;
pub use registry::{
    CancelMoneyTransferHandler, MoneyTransferHandler, RegistryError, TaskContext, TaskHandler,
    TaskRegistry, TaskRegistryBuilder,
};
pub use worker::{PollReport, Scheduler, SchedulerHandle, SchedulerSettings, SweepReport};

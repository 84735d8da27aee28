//! `forgepay-tasks`: units of asynchronous work and their payloads.

pub mod task;

pub use task::{
    CancelMoneyTransferTaskData, ExecutionResult, MoneyTransferTaskData, Task, TaskAttributes,
    TaskName, TaskStatus, stale_before,
};

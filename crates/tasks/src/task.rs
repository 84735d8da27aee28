//! Core task types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use forgepay_core::{Entity, TaskId};
use forgepay_transactions::{MoneyTransferActionAttributes, TransactionRef};

/// Closed set of task kinds; each maps to exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskName {
    MoneyTransfer,
    CancelMoneyTransfer,
}

forgepay_core::string_enum!(TaskName, "name", [MoneyTransfer, CancelMoneyTransfer]);

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Queued, waiting to be claimed
    Ready,
    /// Claimed; either executing or failed and waiting for the retry sweep
    Running,
    /// Handler succeeded
    Executed,
    /// Retry budget exhausted
    Aborted,
}

forgepay_core::string_enum!(TaskStatus, "status", [Ready, Running, Executed, Aborted]);

/// Record of one execution attempt. `error` is empty on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub executed_at: DateTime<Utc>,
    pub error: String,
}

impl ExecutionResult {
    pub fn success(executed_at: DateTime<Utc>) -> Self {
        Self {
            executed_at,
            error: String::new(),
        }
    }

    pub fn failure(executed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            executed_at,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Fields supplied when enqueuing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAttributes {
    pub name: TaskName,
    pub runs_at: DateTime<Utc>,
    /// Attempts allowed before the task may be aborted.
    pub number_of_tries: u32,
    pub data: serde_json::Value,
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: TaskName,
    pub status: TaskStatus,
    pub runs_at: DateTime<Utc>,
    #[serde(default)]
    pub last_tried_at: Option<DateTime<Utc>>,
    pub number_of_tried: u32,
    pub number_of_tries: u32,
    #[serde(default)]
    pub execution_results: Vec<ExecutionResult>,
    pub data: serde_json::Value,
}

impl Entity for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Task {
    pub fn new(id: TaskId, attributes: TaskAttributes) -> Self {
        Self {
            id,
            name: attributes.name,
            status: TaskStatus::Ready,
            runs_at: attributes.runs_at,
            last_tried_at: None,
            number_of_tried: 0,
            number_of_tries: attributes.number_of_tries,
            execution_results: Vec::new(),
            data: attributes.data,
        }
    }

    /// Ready, named `name` and due at `now`.
    pub fn is_claimable(&self, name: TaskName, now: DateTime<Utc>) -> bool {
        self.name == name && self.status == TaskStatus::Ready && self.runs_at <= now
    }

    /// Mark task as claimed.
    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.last_tried_at = Some(now);
        self.number_of_tried += 1;
    }

    /// Appends `result`; only a success moves the task out of `Running`.
    pub fn record(&mut self, result: ExecutionResult) {
        if result.is_success() {
            self.status = TaskStatus::Executed;
        }
        self.execution_results.push(result);
    }

    pub fn has_tries_left(&self) -> bool {
        self.number_of_tried < self.number_of_tries
    }

    fn is_stale(&self, before: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Running
            && self.last_tried_at.map_or(true, |at| at < before)
    }

    /// Stuck in `Running` since before `before` with budget left.
    pub fn is_retryable(&self, before: DateTime<Utc>) -> bool {
        self.is_stale(before) && self.has_tries_left()
    }

    /// Stuck in `Running` since before `before` with the budget spent.
    pub fn is_abortable(&self, before: DateTime<Utc>) -> bool {
        self.is_stale(before) && !self.has_tries_left()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.execution_results
            .last()
            .filter(|result| !result.is_success())
            .map(|result| result.error.as_str())
    }

    /// Subject and body of the operator report sent when the task is aborted.
    pub fn abort_report(&self) -> (String, String) {
        let subject = format!("One task aborted: {}", self.name);
        let last_tried_at = self
            .last_tried_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let body = format!(
            "id: {}\nname: {}\nruns_at: {}\nlast_tried_at: {}\nnumber_of_tried: {}\nlast_result: {}",
            self.id,
            self.name,
            self.runs_at.to_rfc3339(),
            last_tried_at,
            self.number_of_tried,
            self.last_error().unwrap_or("-"),
        );
        (subject, body)
    }
}

/// Cut-off for sweeps: tasks last tried before `now - interval` are stale.
pub fn stale_before(now: DateTime<Utc>, interval_in_minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(interval_in_minutes)
        .and_then(|interval| now.checked_sub_signed(interval))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Payload of a `MoneyTransfer` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyTransferTaskData {
    pub action_attributes: MoneyTransferActionAttributes,
}

/// Payload of a `CancelMoneyTransfer` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMoneyTransferTaskData {
    pub transaction: TransactionRef,
}

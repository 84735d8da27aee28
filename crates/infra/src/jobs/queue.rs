//! Task queue: claim, execute, retry and abort.
//!
//! A claimed task is `Running`. A successful run moves it to `Executed`; a
//! failed run appends the error and leaves it `Running` until the retry sweep
//! returns it to `Ready` or, once its budget is spent, the abort sweep moves
//! it to `Aborted`.

use std::sync::Arc;

use tracing::{debug, error, warn};

use forgepay_core::{Clock, DomainError, DomainResult, TaskId, WriteOutcome};
use forgepay_observability::record_outcome;
use forgepay_tasks::{stale_before, ExecutionResult, Task, TaskAttributes, TaskName};

use super::notifier::Notifier;
use super::registry::{TaskContext, TaskRegistry};
use crate::store::TaskStore;

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    registry: Arc<TaskRegistry>,
    context: TaskContext,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl TaskQueue {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<TaskRegistry>,
        context: TaskContext,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            context,
            notifier,
            clock,
        }
    }

    /// Persist a `Ready` task.
    pub async fn enqueue(&self, attributes: TaskAttributes) -> DomainResult<Task> {
        let task = Task::new(TaskId::new(), attributes);
        let id = task.id;
        let result = if task.number_of_tries == 0 {
            Err(DomainError::argument("numberOfTries", "must be positive"))
        } else {
            self.store.insert(task).await.map_err(DomainError::from)
        };
        record_outcome("enqueue", &id, &result);
        result
    }

    pub async fn find_by_id(&self, id: &TaskId) -> DomainResult<Task> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Task"))
    }

    /// Claim the oldest due `Ready` task named `name`.
    pub async fn execute_one_by_name(&self, name: TaskName) -> DomainResult<Option<Task>> {
        let claimed = self.store.claim_next(name, self.clock.now()).await?;
        if let Some(task) = &claimed {
            debug!(
                task_id = %task.id,
                name = %name,
                number_of_tried = task.number_of_tried,
                "claimed task"
            );
        }
        Ok(claimed)
    }

    /// Run `task` through its handler and record the result.
    ///
    /// Handler failures are recorded on the task, not returned.
    pub async fn execute(&self, task: &Task) -> DomainResult<Task> {
        let outcome = self
            .registry
            .dispatch(task.name, task.data.clone(), &self.context)
            .await;
        let executed_at = self.clock.now();
        let result = match outcome {
            Ok(()) => ExecutionResult::success(executed_at),
            Err(err) => {
                let message = format!("{:#}", err);
                warn!(
                    task_id = %task.id,
                    name = %task.name,
                    number_of_tried = task.number_of_tried,
                    error = %message,
                    "task failed"
                );
                ExecutionResult::failure(executed_at, message)
            }
        };

        let recorded = match self.store.record_execution(&task.id, result).await {
            Ok(WriteOutcome::Applied(task)) => Ok(task),
            Ok(WriteOutcome::NoMatch) => Err(DomainError::not_found("Task")),
            Err(err) => Err(err.into()),
        };
        record_outcome("execute", &task.id, &recorded);
        recorded
    }

    /// Claim one task named `name` and execute it.
    pub async fn execute_by_name(&self, name: TaskName) -> DomainResult<Option<Task>> {
        match self.execute_one_by_name(name).await? {
            Some(task) => self.execute(&task).await.map(Some),
            None => Ok(None),
        }
    }

    /// Return stale `Running` tasks with tries left to `Ready`.
    pub async fn retry(&self, interval_in_minutes: i64) -> DomainResult<u64> {
        let before = stale_before(self.clock.now(), interval_in_minutes);
        let reset = self.store.reset_stale(before).await?;
        if reset > 0 {
            tracing::info!(operation = "retry", reset, "tasks returned to ready");
        }
        Ok(reset)
    }

    /// Abort one stale `Running` task whose retry budget is spent.
    pub async fn abort_one(&self, interval_in_minutes: i64) -> DomainResult<Option<Task>> {
        let before = stale_before(self.clock.now(), interval_in_minutes);
        let aborted = self.store.abort_one(before).await?;
        if let Some(task) = &aborted {
            warn!(
                task_id = %task.id,
                name = %task.name,
                number_of_tried = task.number_of_tried,
                "task aborted"
            );
        }
        Ok(aborted)
    }

    /// [`abort_one`](Self::abort_one), then report the aborted task to the
    /// operator. A failed report is logged; the task stays aborted.
    pub async fn abort(&self, interval_in_minutes: i64) -> DomainResult<Option<Task>> {
        let aborted = self.abort_one(interval_in_minutes).await?;
        if let Some(task) = &aborted {
            let (subject, body) = task.abort_report();
            if let Err(err) = self.notifier.report(&subject, &body).await {
                let message = format!("{:#}", err);
                error!(task_id = %task.id, error = %message, "abort report failed");
            }
        }
        Ok(aborted)
    }
}

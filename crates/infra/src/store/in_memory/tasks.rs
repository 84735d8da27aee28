use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forgepay_core::{TaskId, WriteOutcome};
use forgepay_tasks::{ExecutionResult, Task, TaskName, TaskStatus};

use super::Collection;
use crate::store::{StoreResult, TaskStore};

/// In-memory task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Collection<Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> StoreResult<Task> {
        self.tasks.insert(task)
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        self.tasks.get(id)
    }

    async fn claim_next(&self, name: TaskName, now: DateTime<Utc>) -> StoreResult<Option<Task>> {
        // FIFO by runs_at; ids are time-ordered and break ties.
        self.tasks.find_first_and_update(
            |task| task.is_claimable(name, now),
            |task| (task.runs_at, task.id),
            |task| task.claim(now),
        )
    }

    async fn record_execution(
        &self,
        id: &TaskId,
        result: ExecutionResult,
    ) -> StoreResult<WriteOutcome<Task>> {
        self.tasks.find_one_and_update(
            id,
            |task| task.status == TaskStatus::Running,
            |task| task.record(result),
        )
    }

    async fn reset_stale(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        self.tasks.update_many(
            |task| task.is_retryable(before),
            |task| task.status = TaskStatus::Ready,
        )
    }

    async fn abort_one(&self, before: DateTime<Utc>) -> StoreResult<Option<Task>> {
        self.tasks.find_first_and_update(
            |task| task.is_abortable(before),
            |task| (task.last_tried_at, task.id),
            |task| task.status = TaskStatus::Aborted,
        )
    }
}

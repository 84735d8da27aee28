//! Turns terminal transactions into queued tasks.

use std::sync::Arc;

use tracing::{info, warn};

use forgepay_core::{Clock, DomainError, DomainResult};
use forgepay_tasks::{
    CancelMoneyTransferTaskData, MoneyTransferTaskData, TaskAttributes, TaskName,
};
use forgepay_transactions::{Transaction, TransactionStatus};

use super::queue::TaskQueue;
use crate::services::TransactionMachine;

#[derive(Clone)]
pub struct TaskExporter {
    transactions: TransactionMachine,
    queue: TaskQueue,
    clock: Arc<dyn Clock>,
    number_of_tries: u32,
}

fn encode<T: serde::Serialize>(data: T) -> DomainResult<serde_json::Value> {
    serde_json::to_value(data)
        .map_err(|e| DomainError::storage(format!("failed to encode task data: {}", e)))
}

impl TaskExporter {
    pub fn new(
        transactions: TransactionMachine,
        queue: TaskQueue,
        clock: Arc<dyn Clock>,
        number_of_tries: u32,
    ) -> Self {
        Self {
            transactions,
            queue,
            clock,
            number_of_tries,
        }
    }

    /// Export one unexported transaction in `status`.
    ///
    /// If enqueueing fails the transaction stays `Exporting` and the reexport
    /// sweep hands it back; handlers tolerate the duplicate tasks this can
    /// produce.
    pub async fn export_tasks(&self, status: TransactionStatus) -> DomainResult<Option<Transaction>> {
        let Some(transaction) = self.transactions.start_export_tasks(None, status).await? else {
            return Ok(None);
        };

        let tasks = self.tasks_for(&transaction)?;
        let count = tasks.len();
        for attributes in tasks {
            self.queue.enqueue(attributes).await?;
        }

        let exported = self
            .transactions
            .set_tasks_exported_by_id(&transaction.id)
            .await?;
        info!(
            transaction_id = %exported.id,
            status = %exported.status,
            tasks = count,
            "transaction tasks exported"
        );
        Ok(Some(exported))
    }

    fn tasks_for(&self, transaction: &Transaction) -> DomainResult<Vec<TaskAttributes>> {
        let task = |name: TaskName, data: serde_json::Value| TaskAttributes {
            name,
            runs_at: self.clock.now(),
            number_of_tries: self.number_of_tries,
            data,
        };

        match transaction.status {
            TransactionStatus::Confirmed => match &transaction.potential_actions {
                Some(actions) => {
                    let data = encode(MoneyTransferTaskData {
                        action_attributes: actions.money_transfer.clone(),
                    })?;
                    Ok(vec![task(TaskName::MoneyTransfer, data)])
                }
                None => {
                    warn!(
                        transaction_id = %transaction.id,
                        "confirmed without potential actions; nothing to export"
                    );
                    Ok(Vec::new())
                }
            },
            TransactionStatus::Canceled | TransactionStatus::Expired => {
                let data = encode(CancelMoneyTransferTaskData {
                    transaction: transaction.reference(),
                })?;
                Ok(vec![task(TaskName::CancelMoneyTransfer, data)])
            }
            TransactionStatus::InProgress => Ok(Vec::new()),
        }
    }
}

//! Typed task handlers and the closed registry that dispatches to them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use forgepay_tasks::{CancelMoneyTransferTaskData, MoneyTransferTaskData, TaskName};

use crate::saga::MoneyTransferSaga;
use crate::services::{AccountLedger, ActionLog, TransactionMachine};

/// Services a handler may use while executing a task.
#[derive(Clone)]
pub struct TaskContext {
    pub ledger: AccountLedger,
    pub transactions: TransactionMachine,
    pub actions: ActionLog,
}

impl TaskContext {
    pub fn new(ledger: AccountLedger, transactions: TransactionMachine, actions: ActionLog) -> Self {
        Self {
            ledger,
            transactions,
            actions,
        }
    }

    pub fn money_transfer_saga(&self) -> MoneyTransferSaga {
        MoneyTransferSaga::new(
            self.ledger.clone(),
            self.transactions.clone(),
            self.actions.clone(),
        )
    }
}

/// Handler for one task name, receiving the task payload already decoded.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    type Data: DeserializeOwned + Send;

    const NAME: TaskName;

    async fn handle(&self, data: Self::Data, ctx: &TaskContext) -> anyhow::Result<()>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(&self, data: serde_json::Value, ctx: &TaskContext) -> anyhow::Result<()>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: TaskHandler> ErasedHandler for Typed<H> {
    async fn call(&self, data: serde_json::Value, ctx: &TaskContext) -> anyhow::Result<()> {
        let data: H::Data = serde_json::from_value(data)
            .with_context(|| format!("invalid data for task {}", H::NAME))?;
        self.0.handle(data, ctx).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no handler registered for task {0}")]
    MissingHandler(TaskName),
    #[error("more than one handler registered for task {0}")]
    Duplicate(TaskName),
}

#[derive(Default)]
pub struct TaskRegistryBuilder {
    handlers: HashMap<TaskName, Arc<dyn ErasedHandler>>,
    duplicate: Option<TaskName>,
}

impl TaskRegistryBuilder {
    pub fn register<H: TaskHandler>(mut self, handler: H) -> Self {
        if self
            .handlers
            .insert(H::NAME, Arc::new(Typed(handler)))
            .is_some()
        {
            self.duplicate.get_or_insert(H::NAME);
        }
        self
    }

    /// Fails unless every task name has exactly one handler.
    pub fn build(self) -> Result<TaskRegistry, RegistryError> {
        if let Some(name) = self.duplicate {
            return Err(RegistryError::Duplicate(name));
        }
        if let Some(name) = TaskName::ALL
            .iter()
            .find(|name| !self.handlers.contains_key(*name))
        {
            return Err(RegistryError::MissingHandler(*name));
        }
        Ok(TaskRegistry {
            handlers: self.handlers,
        })
    }
}

/// Complete mapping from task name to handler.
pub struct TaskRegistry {
    handlers: HashMap<TaskName, Arc<dyn ErasedHandler>>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    /// Registry with the built-in money-transfer handlers.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::builder()
            .register(MoneyTransferHandler)
            .register(CancelMoneyTransferHandler)
            .build()
    }

    pub(crate) async fn dispatch(
        &self,
        name: TaskName,
        data: serde_json::Value,
        ctx: &TaskContext,
    ) -> anyhow::Result<()> {
        let handler = self
            .handlers
            .get(&name)
            .with_context(|| format!("no handler registered for task {}", name))?;
        handler.call(data, ctx).await
    }
}

/// Settles a confirmed transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct MoneyTransferHandler;

#[async_trait]
impl TaskHandler for MoneyTransferHandler {
    type Data = MoneyTransferTaskData;

    const NAME: TaskName = TaskName::MoneyTransfer;

    async fn handle(&self, data: Self::Data, ctx: &TaskContext) -> anyhow::Result<()> {
        ctx.money_transfer_saga()
            .transfer_money(data.action_attributes)
            .await?;
        Ok(())
    }
}

/// Voids the holds of a canceled or expired transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelMoneyTransferHandler;

#[async_trait]
impl TaskHandler for CancelMoneyTransferHandler {
    type Data = CancelMoneyTransferTaskData;

    const NAME: TaskName = TaskName::CancelMoneyTransfer;

    async fn handle(&self, data: Self::Data, ctx: &TaskContext) -> anyhow::Result<()> {
        ctx.money_transfer_saga()
            .cancel_money_transfer(data.transaction)
            .await?;
        Ok(())
    }
}

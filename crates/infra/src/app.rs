//! Wiring of stores, services, saga and task queue.

use std::sync::Arc;

use forgepay_core::{Clock, SystemClock};

use crate::config::Config;
use crate::jobs::{
    Notifier, RegistryError, Scheduler, SchedulerSettings, TaskContext, TaskExporter, TaskQueue,
    TaskRegistry, TracingNotifier,
};
use crate::saga::{MoneyMovement, MoneyTransferSaga};
use crate::services::{AccountLedger, ActionLog, TransactionMachine};
use crate::store::{
    postgres, AccountStore, ActionStore, InMemoryAccountStore, InMemoryActionStore,
    InMemoryTaskStore, InMemoryTransactionStore, PostgresAccountStore, PostgresActionStore,
    PostgresTaskStore, PostgresTransactionStore, StoreError, TaskStore, TransactionStore,
};

/// One store per entity.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub actions: Arc<dyn ActionStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountStore::new()),
            transactions: Arc::new(InMemoryTransactionStore::new()),
            actions: Arc::new(InMemoryActionStore::new()),
            tasks: Arc::new(InMemoryTaskStore::new()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            accounts: Arc::new(PostgresAccountStore::new(pool.clone())),
            transactions: Arc::new(PostgresTransactionStore::new(pool.clone())),
            actions: Arc::new(PostgresActionStore::new(pool.clone())),
            tasks: Arc::new(PostgresTaskStore::new(pool)),
        }
    }

    /// Postgres when `database_url` is set, in-memory otherwise.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        match &config.database_url {
            Some(url) => {
                let pool = postgres::connect(url, config.database_max_connections).await?;
                Ok(Self::postgres(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                Ok(Self::in_memory())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Every service, ready to use.
#[derive(Clone)]
pub struct App {
    pub ledger: AccountLedger,
    pub transactions: TransactionMachine,
    pub actions: ActionLog,
    pub movement: MoneyMovement,
    pub saga: MoneyTransferSaga,
    pub queue: TaskQueue,
    pub exporter: TaskExporter,
    pub config: Config,
}

impl App {
    pub fn assemble(
        stores: Stores,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Result<Self, RegistryError> {
        let ledger = AccountLedger::new(stores.accounts);
        let transactions = TransactionMachine::new(stores.transactions, clock.clone());
        let actions = ActionLog::new(stores.actions, clock.clone());

        let context = TaskContext::new(ledger.clone(), transactions.clone(), actions.clone());
        let queue = TaskQueue::new(
            stores.tasks,
            Arc::new(TaskRegistry::standard()?),
            context.clone(),
            notifier,
            clock.clone(),
        );
        let exporter = TaskExporter::new(
            transactions.clone(),
            queue.clone(),
            clock,
            config.number_of_tries,
        );

        Ok(Self {
            movement: MoneyMovement::new(ledger.clone(), transactions.clone()),
            saga: context.money_transfer_saga(),
            ledger,
            transactions,
            actions,
            queue,
            exporter,
            config,
        })
    }

    /// Stores from `config`, the system clock and tracing-based reports.
    pub async fn from_config(config: Config) -> Result<Self, StartupError> {
        let stores = Stores::from_config(&config).await?;
        Ok(Self::assemble(
            stores,
            Arc::new(SystemClock),
            Arc::new(TracingNotifier),
            config,
        )?)
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.queue.clone(),
            self.exporter.clone(),
            self.transactions.clone(),
            SchedulerSettings::from(&self.config),
        )
    }
}

//! In-process scheduler driving the task queue and background sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use forgepay_tasks::TaskName;
use forgepay_transactions::{ExpireConditions, TransactionStatus};

use super::export::TaskExporter;
use super::queue::TaskQueue;
use crate::config::Config;
use crate::services::TransactionMachine;

/// `tokio::time::interval` rejects a zero period.
const MIN_TICK: Duration = Duration::from_millis(1);

const EXPORTED_STATUSES: [TransactionStatus; 3] = [
    TransactionStatus::Confirmed,
    TransactionStatus::Canceled,
    TransactionStatus::Expired,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub retry_interval_in_minutes: i64,
    pub abort_interval_in_minutes: i64,
    pub reexport_interval_in_minutes: i64,
    pub batch_size: usize,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval().max(MIN_TICK),
            sweep_interval: config.sweep_interval().max(MIN_TICK),
            retry_interval_in_minutes: config.retry_interval_in_minutes,
            abort_interval_in_minutes: config.abort_interval_in_minutes,
            reexport_interval_in_minutes: config.reexport_interval_in_minutes,
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Counts from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub executed: usize,
    pub exported: usize,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub retried: u64,
    pub aborted: usize,
    pub expired: u64,
    pub reexported: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    queue: TaskQueue,
    exporter: TaskExporter,
    transactions: TransactionMachine,
    settings: SchedulerSettings,
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the current tick and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            error!(error = %err, "scheduler task ended abnormally");
        }
    }
}

impl Scheduler {
    pub fn new(
        queue: TaskQueue,
        exporter: TaskExporter,
        transactions: TransactionMachine,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            queue,
            exporter,
            transactions,
            settings,
        }
    }

    /// Spawn the polling loop on the current tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            info!(
                poll_ms = self.settings.poll_interval.as_millis() as u64,
                sweep_ms = self.settings.sweep_interval.as_millis() as u64,
                "scheduler started"
            );

            let mut poll = tokio::time::interval(self.settings.poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sweep = tokio::time::interval(self.settings.sweep_interval);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = poll.tick() => {
                        let report = self.poll().await;
                        if report != PollReport::default() {
                            debug!(executed = report.executed, exported = report.exported, "poll finished");
                        }
                    }
                    _ = sweep.tick() => {
                        let report = self.sweep().await;
                        if report != SweepReport::default() {
                            info!(
                                retried = report.retried,
                                aborted = report.aborted,
                                expired = report.expired,
                                reexported = report.reexported,
                                "sweep finished"
                            );
                        }
                    }
                }
            }

            info!("scheduler stopped");
        });

        SchedulerHandle { shutdown, join }
    }

    /// Execute due tasks for every name, then export terminal transactions.
    pub async fn poll(&self) -> PollReport {
        let mut report = PollReport::default();

        for &name in TaskName::ALL {
            for _ in 0..self.settings.batch_size {
                match self.queue.execute_by_name(name).await {
                    Ok(Some(_)) => report.executed += 1,
                    Ok(None) => break,
                    Err(err) => {
                        error!(name = %name, error = %err, "task execution failed");
                        break;
                    }
                }
            }
        }

        for status in EXPORTED_STATUSES {
            for _ in 0..self.settings.batch_size {
                match self.exporter.export_tasks(status).await {
                    Ok(Some(_)) => report.exported += 1,
                    Ok(None) => break,
                    Err(err) => {
                        error!(status = %status, error = %err, "task export failed");
                        break;
                    }
                }
            }
        }

        report
    }

    /// Retry, abort, expire and reexport.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let settings = &self.settings;

        match self.queue.retry(settings.retry_interval_in_minutes).await {
            Ok(n) => report.retried = n,
            Err(err) => error!(error = %err, "retry sweep failed"),
        }

        for _ in 0..settings.batch_size {
            match self.queue.abort(settings.abort_interval_in_minutes).await {
                Ok(Some(_)) => report.aborted += 1,
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "abort sweep failed");
                    break;
                }
            }
        }

        match self.transactions.make_expired(&ExpireConditions::default()).await {
            Ok(n) => report.expired = n,
            Err(err) => error!(error = %err, "expiry sweep failed"),
        }

        match self
            .transactions
            .reexport_tasks(settings.reexport_interval_in_minutes)
            .await
        {
            Ok(n) => report.reexported = n,
            Err(err) => error!(error = %err, "reexport sweep failed"),
        }

        report
    }
}

//! Operator notification for aborted tasks.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn report(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Emits reports as `warn` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn report(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::warn!(subject, body, "operator report");
        Ok(())
    }
}

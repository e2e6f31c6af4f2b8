pub mod instagram;

use async_trait::async_trait;

/// Outbound delivery of replies to a chat identity.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;

    /// Read receipt for the guest's last message. Best-effort.
    async fn mark_seen(&self, _to: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Used when no Instagram credentials are configured: replies only go to the log.
pub struct LogOnlyMessenger;

#[async_trait]
impl MessagingProvider for LogOnlyMessenger {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, body, "outbound message (delivery disabled)");
        Ok(())
    }
}

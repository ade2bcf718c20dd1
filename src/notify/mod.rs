use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::ChangeVerdict;

/// A change that crossed the item's threshold.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub item_id: i64,
    pub item_name: String,
    pub url: String,
    pub verdict: ChangeVerdict,
    pub detected_at: DateTime<Utc>,
}

/// Notification collaborator. Delivery failures are logged by the caller and
/// never fail the check cycle.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn on_change_detected(&self, event: &ChangeEvent) -> Result<()>;
}

/// Writes change events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ChangeNotifier for LogNotifier {
    async fn on_change_detected(&self, event: &ChangeEvent) -> Result<()> {
        tracing::info!(
            "Change detected on {} ({}): {}",
            event.item_name,
            event.url,
            event.verdict.description()
        );
        Ok(())
    }
}

/// Forwards change events to a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChangeNotifier for ChannelNotifier {
    async fn on_change_detected(&self, event: &ChangeEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| anyhow::anyhow!("notification channel closed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ChangeEvent {
        ChangeEvent {
            item_id: 7,
            item_name: "News".into(),
            url: "https://example.com".into(),
            verdict: ChangeVerdict::unchanged(10),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_notifier_delivers_events() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        notifier.on_change_detected(&event()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.item_id, 7);
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (notifier, rx) = ChannelNotifier::new(1);
        drop(rx);
        assert!(notifier.on_change_detected(&event()).await.is_err());
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        assert!(LogNotifier.on_change_detected(&event()).await.is_ok());
    }
}

use crate::error::PushError;
use crate::push::models::RawUpdate;
use crate::push::{PushStream, UpdateSource};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

/// In-process push channel. Every subscriber sees each message published
/// after it subscribed.
#[derive(Clone)]
pub struct BroadcastSource {
    tx: broadcast::Sender<RawUpdate>,
}

impl BroadcastSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of live subscribers that received the message.
    pub fn publish(&self, update: RawUpdate) -> usize {
        self.tx.send(update).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSource {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl UpdateSource for BroadcastSource {
    async fn subscribe(&self) -> Result<PushStream, PushError> {
        let mut rx = self.tx.subscribe();

        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(update) => yield update,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "push subscriber lagged, updates dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

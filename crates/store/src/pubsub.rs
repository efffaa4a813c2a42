//! Publish/subscribe boundary for live session events.
//!
//! Delivery is at-most-once and non-durable: subscribers only see messages
//! published after their subscription is active, and a slow subscriber may
//! skip messages it lagged past. Viewers that need the authoritative state
//! read the session record instead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use webpilot_core::Result;

#[async_trait]
pub trait MessageStream: Send {
    /// Next message, or None once the channel can produce no more.
    async fn next(&mut self) -> Option<String>;
}

#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn publish(&self, channel: &str, message: String) -> Result<()>;
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn MessageStream>>;
}

const CHANNEL_CAPACITY: usize = 256;

/// In-process broadcast transport for single-node deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    senders: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.senders.read().await.get(channel) {
            return tx.clone();
        }
        let mut senders = self.senders.write().await;
        senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, channel: &str, message: String) -> Result<()> {
        let tx = self.sender(channel).await;
        // No subscribers means the message is simply dropped, and the
        // channel entry goes with it so finished sessions do not pin
        // their ring buffers until process exit.
        if tx.send(message).is_err() {
            let mut senders = self.senders.write().await;
            if senders
                .get(channel)
                .is_some_and(|tx| tx.receiver_count() == 0)
            {
                senders.remove(channel);
                debug!(channel, "No subscribers, channel entry reclaimed");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn MessageStream>> {
        let rx = self.sender(channel).await.subscribe();
        Ok(Box::new(BroadcastStream { rx }))
    }
}

struct BroadcastStream {
    rx: broadcast::Receiver<String>,
}

#[async_trait]
impl MessageStream for BroadcastStream {
    async fn next(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                // Lagged receivers skip what they missed; at-most-once.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

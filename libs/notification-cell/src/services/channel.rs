use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::error::NotificationError;
use crate::models::QueueEvent;

pub type ChannelReceiver = broadcast::Receiver<String>;

/// The external delivery collaborator: pushes a serialized event to every
/// subscriber of a named channel. Delivery, retry, and connection management
/// are entirely the implementation's responsibility.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn publish(&self, channel: &str, event: &QueueEvent) -> Result<(), NotificationError>;
}

/// In-process delivery over per-channel tokio broadcast senders. Serves the
/// API binary (the realtime layer subscribes here) and the test suite.
pub struct BroadcastDelivery {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
    capacity: usize,
}

impl BroadcastDelivery {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to a channel, creating it on first use.
    pub async fn subscribe(&self, channel: &str) -> ChannelReceiver {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn active_channels(&self) -> Vec<String> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }
}

impl Default for BroadcastDelivery {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Clone for BroadcastDelivery {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            capacity: self.capacity,
        }
    }
}

#[async_trait]
impl DeliveryChannel for BroadcastDelivery {
    async fn publish(&self, channel: &str, event: &QueueEvent) -> Result<(), NotificationError> {
        let message = serde_json::to_string(event)?;

        let channels = self.channels.read().await;
        let sender = channels
            .get(channel)
            .ok_or_else(|| NotificationError::NoSubscribers(channel.to_string()))?;

        sender
            .send(message)
            .map_err(|e| NotificationError::DeliveryFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Published {} event to channel {}", event.kind, channel);
        Ok(())
    }
}

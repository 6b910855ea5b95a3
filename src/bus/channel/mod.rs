//! In-memory channel-based work bus for standalone mode.
//!
//! Uses tokio broadcast channels for pub/sub within a single process.
//! Topic filtering is done on the subscriber side, so the publisher stays
//! payload-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{Result, Topic, WorkBus, WorkMessage};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// In-memory work bus using a tokio broadcast channel.
///
/// Every subscriber receives every published message; subscribers drop
/// messages whose topic they did not ask for.
pub struct ChannelWorkBus {
    sender: broadcast::Sender<WorkMessage>,
}

impl ChannelWorkBus {
    /// Create a new channel work bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        info!("Channel work bus initialized");
        Self { sender }
    }

    /// Subscribe to the given topics.
    ///
    /// The subscription only sees messages published after this call.
    pub fn subscribe(&self, topics: &[Topic]) -> WorkSubscriber {
        WorkSubscriber {
            receiver: self.sender.subscribe(),
            topics: topics.to_vec(),
        }
    }
}

impl Default for ChannelWorkBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkBus for ChannelWorkBus {
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<()> {
        match self.sender.send(WorkMessage { topic, payload }) {
            Ok(receiver_count) => {
                debug!(topic = %topic, receivers = receiver_count, "Published work order");
            }
            Err(_) => {
                // No receivers; fire-and-forget means that is not an error.
                debug!(topic = %topic, "Published work order (no receivers)");
            }
        }
        Ok(())
    }
}

/// A topic-filtered subscription to the channel bus.
pub struct WorkSubscriber {
    receiver: broadcast::Receiver<WorkMessage>,
    topics: Vec<Topic>,
}

impl WorkSubscriber {
    /// Receive the next message on a subscribed topic.
    ///
    /// Returns `None` once the bus is closed. Lagged messages are skipped
    /// with a warning; the quorum timeout upstream covers the loss.
    pub async fn recv(&mut self) -> Option<WorkMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.topics.contains(&message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Work subscriber lagged, skipped messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

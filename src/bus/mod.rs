//! Work broadcast bus.
//!
//! Fans one encoded work order out to every subscribed worker on a topic.
//! The bus is payload-agnostic: it carries a topic tag and opaque bytes,
//! with no delivery acknowledgement. Reliability is entirely the worker
//! result-reporting path's responsibility.

use async_trait::async_trait;
use bytes::Bytes;

pub mod channel;

pub use channel::{ChannelWorkBus, WorkSubscriber};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Broadcast topic, one per request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Fetch,
    Restock,
}

impl Topic {
    /// Wire tag for the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Fetch => "FETCH",
            Topic::Restock => "RESTOCK",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message on the bus: a topic tag and the encoded work order.
#[derive(Debug, Clone)]
pub struct WorkMessage {
    pub topic: Topic,
    pub payload: Bytes,
}

/// Interface for broadcasting work orders to workers.
///
/// Publishing is fire-and-forget: there is no delivery acknowledgement and
/// no retry. A worker that misses a broadcast causes a quorum timeout
/// upstream, not a redelivery.
#[async_trait]
pub trait WorkBus: Send + Sync {
    /// Publish one message to all current subscribers of the topic.
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<()>;
}

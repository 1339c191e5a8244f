//! MessageBroker port - Interface to the publish/subscribe device network.
//!
//! The hub holds exactly one broker connection for its lifetime. Outbound
//! traffic goes through the trait methods; inbound traffic arrives as
//! [`BrokerMessage`]s on the single [`BrokerInbox`] handed out when the
//! connection is made.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::foundation::{DomainError, ErrorCode};

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    /// Create a message from a topic and raw payload.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Receiving end for every inbound broker message. Bounded: a slow
/// consumer holds back the connection instead of buffering without limit.
pub type BrokerInbox = mpsc::Receiver<BrokerMessage>;

/// Errors that can occur talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Connection could not be established or was refused
    #[error("Broker connection failed: {0}")]
    Connection(String),

    /// Broker did not acknowledge the connection in time
    #[error("Broker did not acknowledge connection within {0} seconds")]
    ConnectTimeout(u64),

    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Unsubscribe from '{topic}' failed: {reason}")]
    Unsubscribe { topic: String, reason: String },
}

impl From<BrokerError> for DomainError {
    fn from(err: BrokerError) -> Self {
        DomainError::new(ErrorCode::BrokerUnavailable, err.to_string())
    }
}

/// Port for the shared publish/subscribe connection.
///
/// Implementations must:
/// - Return from `publish` only once the broker acknowledged the message
///   (for QoS 0, once it was written to the connection)
/// - Fail promptly while the connection is down rather than queue the request
/// - Propagate failures to the caller without retrying
/// - Treat repeated `subscribe` calls for one topic as harmless
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish a payload to a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Register interest in a topic.
    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    /// Drop interest in a topic.
    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError>;
}

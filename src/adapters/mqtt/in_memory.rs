//! In-memory message broker for testing.
//!
//! Records every publish/subscribe/unsubscribe in call order so tests can
//! assert on exactly what the hub sent to the device network.
//!
//! # Security Note
//!
//! This adapter is for **testing only** and should not be used in production.
//! It uses `.expect()` on lock operations which will panic if locks are poisoned.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::ports::{BrokerError, MessageBroker};

/// One recorded broker interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Publish { topic: String, payload: Vec<u8> },
    Subscribe(String),
    Unsubscribe(String),
}

/// In-memory broker capturing calls for assertions.
///
/// Nothing is routed back to subscribers; tests feed inbound traffic to the
/// controller directly.
///
/// # Panics
///
/// Methods may panic if the internal lock is poisoned.
///
/// # Example
///
/// ```ignore
/// let broker = Arc::new(InMemoryBroker::new());
/// controller.request_state(DeviceName::DeskLamp).await?;
/// assert_eq!(broker.publishes_to("nexus/desk_lamp/get").len(), 1);
/// ```
pub struct InMemoryBroker {
    calls: RwLock<Vec<BrokerCall>>,
    failing: AtomicBool,
    failing_subscribes: AtomicBool,
}

impl InMemoryBroker {
    /// Creates a broker with an empty call log.
    pub fn new() -> Self {
        Self {
            calls: RwLock::new(Vec::new()),
            failing: AtomicBool::new(false),
            failing_subscribes: AtomicBool::new(false),
        }
    }

    // === Test Helpers ===

    /// Returns every recorded call in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls
            .read()
            .expect("InMemoryBroker: calls lock poisoned")
            .clone()
    }

    /// Payloads published to `topic`, oldest first.
    pub fn publishes_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Publish { topic: t, payload } if t == topic => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// How many times `topic` was subscribed.
    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BrokerCall::Subscribe(t) if t == topic))
            .count()
    }

    /// How many times `topic` was unsubscribed.
    pub fn unsubscribe_count(&self, topic: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BrokerCall::Unsubscribe(t) if t == topic))
            .count()
    }

    /// Clears the call log (for test isolation).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.calls
            .write()
            .expect("InMemoryBroker: calls write lock poisoned")
            .clear();
    }

    /// Makes every subsequent call fail (or succeed again). Failed calls are
    /// not recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes only subscribe calls fail, leaving publishes working.
    pub fn fail_subscribes(&self, failing: bool) {
        self.failing_subscribes.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: BrokerCall) {
        self.calls
            .write()
            .expect("InMemoryBroker: calls write lock poisoned")
            .push(call);
    }

    fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.is_failing() {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "broker offline".to_string(),
            });
        }
        self.record(BrokerCall::Publish {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        if self.is_failing() || self.failing_subscribes.load(Ordering::SeqCst) {
            return Err(BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: "broker offline".to_string(),
            });
        }
        self.record(BrokerCall::Subscribe(topic.to_string()));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        if self.is_failing() {
            return Err(BrokerError::Unsubscribe {
                topic: topic.to_string(),
                reason: "broker offline".to_string(),
            });
        }
        self.record(BrokerCall::Unsubscribe(topic.to_string()));
        Ok(())
    }
}

//! MQTT adapters for the `MessageBroker` port.
//!
//! - `MqttBroker` - rumqttc connection used in production
//! - `InMemoryBroker` - call recorder for tests

mod client;
mod in_memory;

pub use client::MqttBroker;
pub use in_memory::{BrokerCall, InMemoryBroker};

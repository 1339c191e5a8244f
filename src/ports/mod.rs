//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the device bridge and the outside world. Adapters implement these ports.
//!
//! - `MessageBroker` - The shared publish/subscribe connection to the device network
//! - `DeviceListener` - Receiver of fanned-out device state updates

mod device_listener;
mod message_broker;

pub use device_listener::DeviceListener;
pub use message_broker::{BrokerError, BrokerInbox, BrokerMessage, MessageBroker};

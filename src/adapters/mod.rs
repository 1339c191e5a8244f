//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the hub to external systems:
//! - `mqtt` - Device network connection (rumqttc, in-memory)
//! - `websocket` - Dashboard connections and the wire protocol
//! - `http` - Axum application router

pub mod http;
pub mod mqtt;
pub mod websocket;

pub use mqtt::{BrokerCall, InMemoryBroker, MqttBroker};
pub use websocket::{DeviceSession, ZigbeeState};

//! Application layer - device coordination.
//!
//! Coordinates the broker port with the listeners that care about device
//! state. Adapters (WebSocket sessions) talk to devices only through here.

pub mod device_controller;

pub use device_controller::DeviceController;

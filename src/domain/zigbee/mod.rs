//! Zigbee device catalog.
//!
//! The device set is closed and known at compile time. Each device has its
//! own state shape and a fixed set of MQTT topics under the deployment's
//! base topic.

mod device;
mod state;
mod topics;

pub use device::DeviceName;
pub use state::{
    DeskLampState, DeviceState, LevelConfig, LivingRoomFloorLampState, OnLevel, OnLevelKeyword,
    PowerState, TypedState, UpdateInfo, UpdateStatus,
};
pub use topics::{DeviceTopics, ZIGBEE_BASE_TOPIC};

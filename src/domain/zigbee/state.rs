//! Per-device state.
//!
//! A [`DeviceState`] carries whatever JSON the gateway reported or the
//! dashboard sent, untouched. The typed shapes below are a best-effort view
//! over that value: a payload that does not fit them is still a valid state
//! and is forwarded unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DeviceName;

/// On/off switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "TOGGLE")]
    Toggle,
}

/// State of the desk lamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeskLampState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PowerState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// State of the living room floor lamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LivingRoomFloorLampState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PowerState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_config: Option<LevelConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkquality: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateInfo>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Power-on behaviour of a dimmable light.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_level: Option<OnLevel>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Brightness to restore when switched on: the previous level or a fixed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnLevel {
    Keyword(OnLevelKeyword),
    Level(u8),
}

/// Named on-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnLevelKeyword {
    Previous,
}

/// Firmware update information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<UpdateStatus>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Firmware update status. Firmware reports statuses beyond the ones
/// listed here; those read as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Available,
    Idle,
    Updating,
    #[serde(other)]
    Other,
}

/// Typed view of a state value, when it fits the device's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedState {
    DeskLamp(DeskLampState),
    LivingRoomFloorLamp(LivingRoomFloorLampState),
}

/// A state value tagged by the device it belongs to.
///
/// Serializes as the bare JSON value; the device itself travels alongside
/// (in the topic, or in `deviceName` on the wire).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeviceState {
    #[serde(skip)]
    device: DeviceName,
    value: Value,
}

impl DeviceState {
    /// Wrap any JSON value as the state of `device`.
    pub fn from_value(device: DeviceName, value: Value) -> Self {
        Self { device, value }
    }

    /// Parse a raw payload. Fails only when the bytes are not JSON.
    pub fn from_slice(device: DeviceName, payload: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self::from_value(device, serde_json::from_slice(payload)?))
    }

    /// The device this state belongs to.
    pub fn device(&self) -> DeviceName {
        self.device
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// The value read through the device's typed shape, if it fits.
    pub fn typed(&self) -> Option<TypedState> {
        match self.device {
            DeviceName::DeskLamp => serde_json::from_value(self.value.clone())
                .ok()
                .map(TypedState::DeskLamp),
            DeviceName::LivingRoomFloorLamp => serde_json::from_value(self.value.clone())
                .ok()
                .map(TypedState::LivingRoomFloorLamp),
        }
    }

    /// Power state, when the value carries a recognised one.
    pub fn power(&self) -> Option<PowerState> {
        self.value
            .get("state")
            .and_then(|v| PowerState::deserialize(v).ok())
    }

    /// Brightness, when the value carries one in range.
    pub fn brightness(&self) -> Option<u8> {
        self.value
            .get("brightness")
            .and_then(Value::as_u64)
            .and_then(|b| u8::try_from(b).ok())
    }
}

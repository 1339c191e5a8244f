//! Device identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Identifier of a known Zigbee device.
///
/// Serialized as the friendly name the gateway publishes under
/// (`desk_lamp`, `living_room_floor_lamp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceName {
    DeskLamp,
    LivingRoomFloorLamp,
}

impl DeviceName {
    /// Every device in the catalog, in catalog order.
    pub const ALL: [DeviceName; 2] = [DeviceName::DeskLamp, DeviceName::LivingRoomFloorLamp];

    /// Returns the gateway friendly name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceName::DeskLamp => "desk_lamp",
            DeviceName::LivingRoomFloorLamp => "living_room_floor_lamp",
        }
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceName::ALL
            .into_iter()
            .find(|device| device.as_str() == s)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::UnknownDevice, format!("Unknown device: {}", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_is_stable() {
        assert_eq!(
            DeviceName::ALL,
            [DeviceName::DeskLamp, DeviceName::LivingRoomFloorLamp]
        );
    }

    #[test]
    fn as_str_matches_serde_name() {
        for device in DeviceName::ALL {
            let json = serde_json::to_string(&device).unwrap();
            assert_eq!(json, format!("\"{}\"", device.as_str()));
        }
    }

    #[test]
    fn parses_known_names() {
        assert_eq!("desk_lamp".parse::<DeviceName>().unwrap(), DeviceName::DeskLamp);
        assert_eq!(
            "living_room_floor_lamp".parse::<DeviceName>().unwrap(),
            DeviceName::LivingRoomFloorLamp
        );
    }

    #[test]
    fn rejects_unknown_name() {
        let err = "kitchen_lamp".parse::<DeviceName>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownDevice);
    }
}

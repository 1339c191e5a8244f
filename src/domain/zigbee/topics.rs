//! MQTT topic naming for catalog devices.
//!
//! ```text
//! <base>/<device>        state reports   (gateway -> hub)
//! <base>/<device>/get    state snapshot  (hub -> gateway)
//! <base>/<device>/set    state command   (hub -> gateway)
//! ```

use super::DeviceName;

/// Base topic the gateway publishes under when none is configured.
pub const ZIGBEE_BASE_TOPIC: &str = "nexus";

/// Builds and parses the topics for one base namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    base: String,
}

impl DeviceTopics {
    /// Create topics under `base`. A trailing `/` is ignored.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// The namespace prefix.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Topic the device reports its state on.
    pub fn state(&self, device: DeviceName) -> String {
        format!("{}/{}", self.base, device)
    }

    /// Topic that asks the device to report its current state.
    pub fn get(&self, device: DeviceName) -> String {
        format!("{}/{}/get", self.base, device)
    }

    /// Topic that commands a state change.
    pub fn set(&self, device: DeviceName) -> String {
        format!("{}/{}/set", self.base, device)
    }

    /// Resolve a state topic back to its device.
    ///
    /// Only an exact `<base>/<device>` with a catalog device matches; other
    /// namespaces, sub-topics such as `/set`, and unknown names give `None`.
    pub fn parse_state(&self, topic: &str) -> Option<DeviceName> {
        let rest = topic.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        if rest.contains('/') {
            return None;
        }
        rest.parse().ok()
    }
}

impl Default for DeviceTopics {
    fn default() -> Self {
        Self::new(ZIGBEE_BASE_TOPIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn builds_topics_for_device() {
        let topics = DeviceTopics::default();
        assert_eq!(topics.state(DeviceName::DeskLamp), "nexus/desk_lamp");
        assert_eq!(topics.get(DeviceName::DeskLamp), "nexus/desk_lamp/get");
        assert_eq!(topics.set(DeviceName::DeskLamp), "nexus/desk_lamp/set");
    }

    #[test]
    fn trailing_slash_in_base_is_ignored() {
        let topics = DeviceTopics::new("nexus/");
        assert_eq!(topics.state(DeviceName::LivingRoomFloorLamp), "nexus/living_room_floor_lamp");
    }

    #[test]
    fn parse_state_accepts_exact_state_topic() {
        let topics = DeviceTopics::default();
        assert_eq!(topics.parse_state("nexus/desk_lamp"), Some(DeviceName::DeskLamp));
    }

    #[test]
    fn parse_state_rejects_other_namespace() {
        let topics = DeviceTopics::default();
        assert_eq!(topics.parse_state("zigbee2mqtt/desk_lamp"), None);
        assert_eq!(topics.parse_state("nexusx/desk_lamp"), None);
    }

    #[test]
    fn parse_state_rejects_sub_topics_and_unknown_devices() {
        let topics = DeviceTopics::default();
        assert_eq!(topics.parse_state("nexus/desk_lamp/set"), None);
        assert_eq!(topics.parse_state("nexus/bridge"), None);
        assert_eq!(topics.parse_state("nexus"), None);
    }

    #[test]
    fn nested_base_topic_is_supported() {
        let topics = DeviceTopics::new("home/zigbee");
        assert_eq!(
            topics.parse_state("home/zigbee/desk_lamp"),
            Some(DeviceName::DeskLamp)
        );
    }

    proptest! {
        #[test]
        fn state_topic_parses_back_for_any_base(base in "[a-z][a-z0-9_]{0,12}(/[a-z][a-z0-9_]{0,8}){0,2}") {
            let topics = DeviceTopics::new(base);
            for device in DeviceName::ALL {
                prop_assert_eq!(topics.parse_state(&topics.state(device)), Some(device));
                prop_assert_eq!(topics.parse_state(&topics.get(device)), None);
                prop_assert_eq!(topics.parse_state(&topics.set(device)), None);
            }
        }

        #[test]
        fn foreign_topics_never_resolve(topic in "[a-z_/]{0,40}") {
            let topics = DeviceTopics::default();
            if let Some(device) = topics.parse_state(&topic) {
                prop_assert_eq!(topic, topics.state(device));
            }
        }
    }
}

//! MQTT broker configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::zigbee::ZIGBEE_BASE_TOPIC;

/// Connection settings for the shared MQTT broker session
#[derive(Debug, Deserialize)]
pub struct MqttConfig {
    /// Broker host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username (only sent together with a password)
    pub username: Option<String>,

    /// Password
    pub password: Option<SecretString>,

    /// Client identifier, random when absent
    pub client_id: Option<String>,

    /// Topic namespace the gateway publishes device state under
    #[serde(default = "default_base_topic")]
    pub base_topic: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker's CONNACK at startup
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a publish may wait for the broker's acknowledgement
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,

    /// QoS for publishes and subscriptions (0, 1 or 2)
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Capacity of the client request queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Inbound messages buffered ahead of device dispatch
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl MqttConfig {
    /// Keep-alive interval as Duration
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Validate MQTT configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingRequired("MQTT_HOST"));
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ValidationError::IncompleteCredentials);
        }
        if self.qos > 2 {
            return Err(ValidationError::InvalidQos(self.qos));
        }
        let base = self.base_topic.trim_end_matches('/');
        if base.is_empty() || base.contains(['+', '#']) {
            return Err(ValidationError::InvalidBaseTopic(self.base_topic.clone()));
        }
        if self.keep_alive_secs < 5 {
            return Err(ValidationError::KeepAliveTooShort);
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 120 {
            return Err(ValidationError::InvalidConnectTimeout);
        }
        if self.ack_timeout_secs == 0 || self.ack_timeout_secs > 120 {
            return Err(ValidationError::InvalidAckTimeout);
        }
        if self.channel_capacity == 0 || self.inbox_capacity == 0 {
            return Err(ValidationError::InvalidChannelCapacity);
        }
        Ok(())
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            client_id: None,
            base_topic: default_base_topic(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            ack_timeout_secs: default_ack_timeout(),
            qos: default_qos(),
            channel_capacity: default_channel_capacity(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_base_topic() -> String {
    ZIGBEE_BASE_TOPIC.to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_ack_timeout() -> u64 {
    10
}

fn default_qos() -> u8 {
    1
}

fn default_channel_capacity() -> usize {
    64
}

fn default_inbox_capacity() -> usize {
    256
}

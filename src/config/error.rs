//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("MQTT username and password must be set together")]
    IncompleteCredentials,

    #[error("Invalid MQTT QoS level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),

    #[error("Invalid MQTT base topic: {0}")]
    InvalidBaseTopic(String),

    #[error("MQTT keep-alive must be at least 5 seconds")]
    KeepAliveTooShort,

    #[error("MQTT connect timeout must be between 1 and 120 seconds")]
    InvalidConnectTimeout,

    #[error("MQTT channel capacities must be greater than zero")]
    InvalidChannelCapacity,

    #[error("MQTT acknowledgement timeout must be between 1 and 120 seconds")]
    InvalidAckTimeout,

    #[error("Outbound queue capacity must be greater than zero")]
    InvalidOutboundCapacity,
}

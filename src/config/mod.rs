//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `NEXUS` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use nexus_hub::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Broker at {}:{}", config.mqtt.host, config.mqtt.port);
//! ```

mod error;
mod mqtt;
mod server;

pub use error::{ConfigError, ValidationError};
pub use mqtt::MqttConfig;
pub use server::{LogFormat, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a hub that
/// talks to a broker on `localhost:1883` and serves on port 8000.
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Dashboard server (listener, logging, connection limits)
    #[serde(default)]
    pub server: ServerConfig,

    /// MQTT broker connection
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `NEXUS` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `NEXUS__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `NEXUS__MQTT__HOST=broker.lan` -> `mqtt.host = broker.lan`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("NEXUS")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.mqtt.validate()?;
        Ok(())
    }

    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.server.json_logs()
    }
}

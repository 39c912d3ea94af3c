//! Application configuration module
//!
//! Configuration is loaded from environment variables (and a `.env` file
//! when present) using the `config` and `dotenvy` crates. Variables carry
//! the `CONDUCTOR` prefix and nested values are separated by `__`.
//!
//! # Example
//!
//! ```no_run
//! use conductor::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod capabilities;
mod error;
mod memory;
mod routing;
mod server;

pub use capabilities::CapabilitiesConfig;
pub use error::{ConfigError, ValidationError};
pub use memory::MemoryConfig;
pub use routing::RoutingConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration. Every section has defaults, so an
/// empty environment yields a runnable development setup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, logging, request timeout)
    #[serde(default)]
    pub server: ServerConfig,

    /// Provider circuit breakers and retries
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Capability registry and rate limiting
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    /// Session state and semantic recall
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// - `CONDUCTOR__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `CONDUCTOR__ROUTING__FAILURE_THRESHOLD=5` -> `routing.failure_threshold = 5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CONDUCTOR")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.routing.validate()?;
        self.capabilities.validate()?;
        self.memory.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

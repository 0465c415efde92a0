//! Typed configuration for the planvault service.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`PlanvaultConfig`] holds every section:
//!
//! - [`ServerConfig`] - HTTP listener, timeouts, body limit
//! - [`PlanConfig`] - resource type and optional schema override
//! - [`StoreConfig`] - in-memory or Redis storage
//! - [`QueueConfig`] - where index intents go, and how delivery is retried
//! - [`AuthConfig`] - static bearer tokens
//! - [`TelemetryConfigSection`] - metrics and logging
//!
//! # Example
//!
//! ```no_run
//! use planvault_config::ConfigLoader;
//!
//! # fn main() -> Result<(), planvault_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("planvault.toml")?
//!     .with_env_prefix("PLANVAULT")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! request_timeout_ms = 30000
//! max_body_bytes = 1048576
//!
//! [plan]
//! resource_type = "plan"
//!
//! [store]
//! backend = "redis"
//!
//! [store.redis]
//! addr = "127.0.0.1:6379"
//! db = 0
//!
//! [queue]
//! backend = "rabbitmq"
//!
//! [queue.rabbitmq]
//! api_url = "http://localhost:15672"
//! exchange = "amq.default"
//! routing_key = "plan-index"
//!
//! [auth]
//! enabled = true
//! tokens = ["s3cret"]
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `PLANVAULT__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `PLANVAULT__STORE__REDIS__ADDR=redis:6379`
//! - `PLANVAULT__AUTH__TOKENS=token-a,token-b`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlanvaultConfig::default();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.queue.backend, QueueBackend::Log);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = PlanvaultConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: PlanvaultConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}

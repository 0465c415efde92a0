//! Main configuration types.
//!
//! This module provides the top-level [`PlanvaultConfig`] struct and its builder.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{
    AuthConfig, ConfigError, LogFormat, PlanConfig, QueueBackend, QueueConfig, ServerConfig,
    StoreBackend, StoreConfig, TelemetryConfigSection,
};

/// Complete planvault service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use planvault_config::PlanvaultConfig;
///
/// let config = PlanvaultConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.plan.resource_type, "plan");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PlanvaultConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Plan resource configuration.
    #[serde(default)]
    pub plan: PlanConfig,

    /// Storage configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Index queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Bearer token gate.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl PlanvaultConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use planvault_config::{PlanvaultConfig, ServerConfig};
    ///
    /// let config = PlanvaultConfig::builder()
    ///     .server(ServerConfig {
    ///         http_addr: "127.0.0.1:3000".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    #[must_use]
    pub fn builder() -> PlanvaultConfigBuilder {
        PlanvaultConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` or `ConfigError::ValidationError`
    /// describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than 0",
            ));
        }

        if self.plan.resource_type.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "plan.resource_type",
                "must not be empty",
            ));
        }

        if self.store.redis.pool_size == 0 {
            return Err(ConfigError::invalid_value(
                "store.redis.pool_size",
                "must be greater than 0",
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis.addr.is_empty() {
            return Err(ConfigError::invalid_value(
                "store.redis.addr",
                "must be set when store.backend is 'redis'",
            ));
        }

        if self.queue.backend == QueueBackend::Rabbitmq {
            let rabbitmq = &self.queue.rabbitmq;
            if !(rabbitmq.api_url.starts_with("http://") || rabbitmq.api_url.starts_with("https://")) {
                return Err(ConfigError::invalid_value(
                    "queue.rabbitmq.api_url",
                    format!("expected an http(s) URL, got {}", rabbitmq.api_url),
                ));
            }
            if rabbitmq.exchange.is_empty() {
                return Err(ConfigError::invalid_value(
                    "queue.rabbitmq.exchange",
                    "must not be empty",
                ));
            }
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::invalid_value(
                "queue.capacity",
                "must be greater than 0",
            ));
        }
        if self.queue.retry.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "queue.retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.queue.retry.initial_backoff_ms > self.queue.retry.max_backoff_ms {
            return Err(ConfigError::validation_error(
                "queue.retry.initial_backoff_ms must not exceed queue.retry.max_backoff_ms",
            ));
        }

        if self.auth.enabled && self.auth.tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::validation_error(
                "auth.tokens must not be empty when auth is enabled",
            ));
        }

        let buckets = &self.telemetry.metrics.histogram_buckets;
        if buckets.is_empty() || buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.histogram_buckets",
                "must be non-empty and strictly increasing",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug logs, intents written to the log, in-memory storage.
    ///
    /// # Example
    ///
    /// ```
    /// use planvault_config::PlanvaultConfig;
    ///
    /// let config = PlanvaultConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.environment = "development".to_string();

        config.store.backend = StoreBackend::Memory;
        config.queue.backend = QueueBackend::Log;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON info logs, Redis storage, RabbitMQ publishing.
    ///
    /// # Example
    ///
    /// ```
    /// use planvault_config::{PlanvaultConfig, StoreBackend};
    ///
    /// let config = PlanvaultConfig::production();
    /// assert_eq!(config.store.backend, StoreBackend::Redis);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.environment = "production".to_string();

        config.store.backend = StoreBackend::Redis;
        config.queue.backend = QueueBackend::Rabbitmq;

        config
    }
}

/// Builder for [`PlanvaultConfig`].
#[derive(Debug, Default)]
pub struct PlanvaultConfigBuilder {
    config: PlanvaultConfig,
}

impl PlanvaultConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Set the plan resource configuration.
    #[must_use]
    pub fn plan(mut self, plan: PlanConfig) -> Self {
        self.config.plan = plan;
        self
    }

    /// Set the storage configuration.
    #[must_use]
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Set the queue configuration.
    #[must_use]
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Set the auth configuration.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Build the configuration without validation.
    #[must_use]
    pub fn build(self) -> PlanvaultConfig {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<PlanvaultConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

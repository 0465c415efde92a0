//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{ConfigError, LogFormat, PlanvaultConfig, QueueBackend, StoreBackend};

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "PLANVAULT";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. `.env` file, if present
/// 4. Environment variables (`PREFIX__SECTION__KEY`)
///
/// # Example
///
/// ```no_run
/// use planvault_config::ConfigLoader;
///
/// # fn main() -> Result<(), planvault_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("planvault.toml")?
///     .with_dotenv()?
///     .with_env_prefix("PLANVAULT")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: PlanvaultConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PlanvaultConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PlanvaultConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use planvault_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PlanvaultConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = PlanvaultConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format (TOML or JSON) is chosen by the file extension. Sections
    /// and fields missing from the file take their default values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use planvault_config::{ConfigLoader, StoreBackend};
    ///
    /// let toml = r#"
    ///     [store]
    ///     backend = "redis"
    ///
    ///     [store.redis]
    ///     addr = "redis:6379"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.store.backend, StoreBackend::Redis);
    /// assert_eq!(config.store.redis.addr, "redis:6379");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `PLANVAULT__SERVER__HTTP_ADDR=0.0.0.0:9000` or
    /// `PLANVAULT__QUEUE__RABBITMQ__EXCHANGE=plans`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the working directory, if there is one.
    ///
    /// Variables already set in the process environment win.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a configuration file was loaded.
    #[must_use]
    pub const fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides, validate, and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<PlanvaultConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> PlanvaultConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<PlanvaultConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(&marker))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Server
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_num(key, value)?;
            }
            ["SERVER", "MAX_CONNECTIONS"] => config.server.max_connections = parse_num(key, value)?,
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_num(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_num(key, value)?,

            // Plan
            ["PLAN", "RESOURCE_TYPE"] => config.plan.resource_type = value.to_string(),
            ["PLAN", "SCHEMA_PATH"] => config.plan.schema_path = non_empty(value),

            // Store
            ["STORE", "BACKEND"] => {
                config.store.backend = match value.to_lowercase().as_str() {
                    "memory" => StoreBackend::Memory,
                    "redis" => StoreBackend::Redis,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'memory' or 'redis'")),
                };
            }
            ["STORE", "REDIS", "ADDR"] => config.store.redis.addr = value.to_string(),
            ["STORE", "REDIS", "DB"] => config.store.redis.db = parse_num(key, value)?,
            ["STORE", "REDIS", "PASSWORD"] => config.store.redis.password = non_empty(value),
            ["STORE", "REDIS", "TIMEOUT_MS"] => config.store.redis.timeout_ms = parse_num(key, value)?,
            ["STORE", "REDIS", "POOL_SIZE"] => config.store.redis.pool_size = parse_num(key, value)?,

            // Queue
            ["QUEUE", "BACKEND"] => {
                config.queue.backend = match value.to_lowercase().as_str() {
                    "log" => QueueBackend::Log,
                    "rabbitmq" => QueueBackend::Rabbitmq,
                    "disabled" => QueueBackend::Disabled,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'log', 'rabbitmq', or 'disabled'",
                        ))
                    }
                };
            }
            ["QUEUE", "CAPACITY"] => config.queue.capacity = parse_num(key, value)?,
            ["QUEUE", "RABBITMQ", "API_URL"] => config.queue.rabbitmq.api_url = value.to_string(),
            ["QUEUE", "RABBITMQ", "VHOST"] => config.queue.rabbitmq.vhost = value.to_string(),
            ["QUEUE", "RABBITMQ", "EXCHANGE"] => config.queue.rabbitmq.exchange = value.to_string(),
            ["QUEUE", "RABBITMQ", "ROUTING_KEY"] => {
                config.queue.rabbitmq.routing_key = value.to_string();
            }
            ["QUEUE", "RABBITMQ", "USERNAME"] => config.queue.rabbitmq.username = value.to_string(),
            ["QUEUE", "RABBITMQ", "PASSWORD"] => config.queue.rabbitmq.password = value.to_string(),
            ["QUEUE", "RABBITMQ", "TIMEOUT_MS"] => {
                config.queue.rabbitmq.timeout_ms = parse_num(key, value)?;
            }
            ["QUEUE", "RETRY", "MAX_ATTEMPTS"] => config.queue.retry.max_attempts = parse_num(key, value)?,
            ["QUEUE", "RETRY", "INITIAL_BACKOFF_MS"] => {
                config.queue.retry.initial_backoff_ms = parse_num(key, value)?;
            }
            ["QUEUE", "RETRY", "MAX_BACKOFF_MS"] => {
                config.queue.retry.max_backoff_ms = parse_num(key, value)?;
            }

            // Auth
            ["AUTH", "ENABLED"] => config.auth.enabled = parse_flag(key, value)?,
            ["AUTH", "TOKENS"] => {
                config.auth.tokens = value
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }

            // Telemetry
            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "ENVIRONMENT"] => config.telemetry.environment = value.to_string(),
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                config.telemetry.logging.include_location = parse_flag(key, value)?;
            }

            // Unknown keys are ignored so unrelated PLANVAULT__* variables don't
            // break startup.
            _ => {}
        }

        Ok(())
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

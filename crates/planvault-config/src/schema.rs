//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections. Every
//! section rejects unknown fields and fills missing ones with defaults.

use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use planvault_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.max_body_bytes, 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10000
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Plan resource section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    /// Resource type tag prefixed to storage keys.
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    /// JSON schema file replacing the bundled plan schema.
    #[serde(default)]
    pub schema_path: Option<String>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            resource_type: default_resource_type(),
            schema_path: None,
        }
    }
}

fn default_resource_type() -> String {
    "plan".to_string()
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map; data is lost on restart.
    #[default]
    Memory,
    /// Redis server.
    Redis,
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// `host:port` of the server.
    #[serde(default = "default_redis_addr")]
    pub addr: String,

    /// Logical database index.
    #[serde(default)]
    pub db: u32,

    /// Password for `AUTH`.
    #[serde(default)]
    pub password: Option<String>,

    /// Command timeout in milliseconds.
    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,

    /// Most connections open at once.
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: default_redis_addr(),
            db: 0,
            password: None,
            timeout_ms: default_redis_timeout(),
            pool_size: default_redis_pool_size(),
        }
    }
}

fn default_redis_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_redis_timeout() -> u64 {
    5000
}

fn default_redis_pool_size() -> usize {
    8
}

/// Storage section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis settings, used when `backend = "redis"`.
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Index intent destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Write intents to the log.
    #[default]
    Log,
    /// Publish to RabbitMQ.
    Rabbitmq,
    /// Discard intents.
    Disabled,
}

/// RabbitMQ management API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RabbitMqConfig {
    /// Base URL of the management API.
    #[serde(default = "default_rabbitmq_api_url")]
    pub api_url: String,

    /// Virtual host.
    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Exchange to publish to.
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Routing key for every intent.
    #[serde(default = "default_routing_key")]
    pub routing_key: String,

    /// Management API user.
    #[serde(default = "default_guest")]
    pub username: String,

    /// Management API password.
    #[serde(default = "default_guest")]
    pub password: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_rabbitmq_timeout")]
    pub timeout_ms: u64,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            api_url: default_rabbitmq_api_url(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            routing_key: default_routing_key(),
            username: default_guest(),
            password: default_guest(),
            timeout_ms: default_rabbitmq_timeout(),
        }
    }
}

fn default_rabbitmq_api_url() -> String {
    "http://localhost:15672".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    "amq.default".to_string()
}

fn default_routing_key() -> String {
    "plan-index".to_string()
}

fn default_guest() -> String {
    "guest".to_string()
}

fn default_rabbitmq_timeout() -> u64 {
    5000
}

/// Delivery retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per intent, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on a single delay, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    5000
}

/// Index queue section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Where intents go.
    #[serde(default)]
    pub backend: QueueBackend,

    /// Intents buffered ahead of delivery; further intents are dropped.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// RabbitMQ settings, used when `backend = "rabbitmq"`.
    #[serde(default)]
    pub rabbitmq: RabbitMqConfig,

    /// Retry policy for failed deliveries.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            capacity: default_queue_capacity(),
            rabbitmq: RabbitMqConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

/// Bearer token gate section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Require a bearer token on plan routes.
    #[serde(default)]
    pub enabled: bool,

    /// Accepted tokens.
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics collection and the `/metrics` route.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Histogram bucket boundaries for request duration.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter directive (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name for telemetry identification.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment (e.g., "development", "staging", "production").
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "planvault".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.request_timeout_ms, 30000);
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn test_server_config_deserialize() {
        let toml = r#"
            http_addr = "127.0.0.1:3000"
            max_body_bytes = 4096
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:3000");
        assert_eq!(config.max_body_bytes, 4096);
        assert_eq!(config.max_connections, 10000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            http_addr = "127.0.0.1:3000"
            unknown_field = "value"
        "#;
        let result: Result<ServerConfig, _> = toml::from_str(toml);
        assert!(result.is_err());

        let result: Result<StoreConfig, _> = toml::from_str("backend = \"redis\"\nhost = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_backends_deserialize() {
        let backend: StoreBackend = serde_json::from_str(r#""redis""#).unwrap();
        assert_eq!(backend, StoreBackend::Redis);
        let backend: QueueBackend = serde_json::from_str(r#""rabbitmq""#).unwrap();
        assert_eq!(backend, QueueBackend::Rabbitmq);
        let backend: QueueBackend = serde_json::from_str(r#""disabled""#).unwrap();
        assert_eq!(backend, QueueBackend::Disabled);
        assert!(serde_json::from_str::<QueueBackend>(r#""kafka""#).is_err());
    }

    #[test]
    fn test_queue_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.backend, QueueBackend::Log);
        assert_eq!(config.rabbitmq.vhost, "/");
        assert_eq!(config.rabbitmq.exchange, "amq.default");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.capacity, 1024);
    }

    #[test]
    fn test_auth_disabled_by_default() {
        let config = AuthConfig::default();
        assert!(!config.enabled);
        assert!(config.tokens.is_empty());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfigSection::default();
        assert_eq!(config.service_name, "planvault");
        assert_eq!(config.environment, "development");
        assert!(config.metrics.enabled);
    }
}

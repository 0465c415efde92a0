//! Building the service from configuration.

use std::sync::Arc;
use std::time::Duration;

use planvault_config::{
    AuthConfig, LogFormat, PlanConfig, PlanvaultConfig, QueueBackend, QueueConfig, StoreBackend,
    StoreConfig,
};
use planvault_core::{
    IndexPublisher, JsonSchemaValidator, MemoryPlanStore, PlanController, PlanStore, SchemaError,
    SchemaValidator,
};
use planvault_queue::{
    ChannelPublisher, DiscardPublisher, IntentSink, LogSink, RabbitMqConfig, RabbitMqSink,
    RetryPolicy,
};
use planvault_redis::{RedisConfig, RedisPlanStore};
use planvault_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

use crate::auth::{BearerAuth, StaticTokenVerifier};
use crate::error::ServerError;
use crate::server::Server;

/// Everything the server needs, built from one [`PlanvaultConfig`].
#[derive(Debug)]
pub struct Components {
    /// The lifecycle controller.
    pub controller: PlanController,
    /// The background publisher, when intents leave the process.
    pub publisher: Option<Arc<ChannelPublisher>>,
    /// The auth gate, when enabled.
    pub auth: Option<BearerAuth>,
}

impl Components {
    /// Builds the store, validator, publisher and controller.
    ///
    /// Must run inside a tokio runtime. A Redis store is pinged up front so
    /// a bad address fails startup.
    pub async fn build(config: &PlanvaultConfig) -> Result<Self, ServerError> {
        let store = build_store(&config.store).await?;
        let validator = build_validator(&config.plan)?;
        let (publisher, channel) = build_publisher(&config.queue)?;

        let controller = PlanController::new(store, publisher, validator)
            .with_resource_type(config.plan.resource_type.clone());

        Ok(Self {
            controller,
            publisher: channel,
            auth: build_auth(&config.auth),
        })
    }

    /// Builds the HTTP server around these components.
    #[must_use]
    pub fn server(&self, config: &PlanvaultConfig) -> Server {
        let mut builder = Server::builder(self.controller.clone())
            .config(config.server.clone())
            .service(
                config.telemetry.service_name.clone(),
                env!("CARGO_PKG_VERSION"),
            );
        if let Some(auth) = &self.auth {
            builder = builder.auth(auth.clone());
        }
        builder.build()
    }

    /// Drains intents still queued for delivery.
    pub async fn shutdown(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.shutdown().await;
        }
    }
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn PlanStore>, ServerError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, plans are lost on restart");
            Ok(Arc::new(MemoryPlanStore::new()))
        }
        StoreBackend::Redis => {
            let redis = RedisConfig {
                addr: config.redis.addr.clone(),
                db: config.redis.db,
                password: config.redis.password.clone(),
                timeout: Duration::from_millis(config.redis.timeout_ms),
                pool_size: config.redis.pool_size,
            };
            tracing::info!(addr = %redis.addr, db = redis.db, "connecting to redis");
            Ok(Arc::new(RedisPlanStore::connect(redis).await?))
        }
    }
}

fn build_validator(config: &PlanConfig) -> Result<Arc<dyn SchemaValidator>, ServerError> {
    let Some(path) = &config.schema_path else {
        return Ok(Arc::new(JsonSchemaValidator::plan()?));
    };

    let text = std::fs::read_to_string(path).map_err(|source| ServerError::SchemaFile {
        path: path.clone(),
        source,
    })?;
    let schema = serde_json::from_str(&text).map_err(|e| SchemaError::InvalidSchema {
        message: format!("{path}: {e}"),
    })?;
    tracing::info!(path = %path, "loaded plan schema");
    Ok(Arc::new(JsonSchemaValidator::from_schema(&schema)?))
}

fn build_publisher(
    config: &QueueConfig,
) -> Result<(Arc<dyn IndexPublisher>, Option<Arc<ChannelPublisher>>), ServerError> {
    let sink: Arc<dyn IntentSink> = match config.backend {
        QueueBackend::Disabled => {
            tracing::info!("indexing disabled, intents are discarded");
            return Ok((Arc::new(DiscardPublisher), None));
        }
        QueueBackend::Log => Arc::new(LogSink),
        QueueBackend::Rabbitmq => {
            let rabbitmq = &config.rabbitmq;
            let sink = RabbitMqSink::new(RabbitMqConfig {
                api_url: rabbitmq.api_url.clone(),
                vhost: rabbitmq.vhost.clone(),
                exchange: rabbitmq.exchange.clone(),
                routing_key: rabbitmq.routing_key.clone(),
                username: rabbitmq.username.clone(),
                password: rabbitmq.password.clone(),
                timeout: Duration::from_millis(rabbitmq.timeout_ms),
            })?;
            tracing::info!(url = %sink.publish_url(), "publishing intents to rabbitmq");
            Arc::new(sink)
        }
    };

    let retry = RetryPolicy {
        max_attempts: config.retry.max_attempts,
        initial_backoff: Duration::from_millis(config.retry.initial_backoff_ms),
        max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
    };
    let channel = Arc::new(ChannelPublisher::spawn(sink, retry, config.capacity));
    let publisher: Arc<dyn IndexPublisher> = channel.clone();
    Ok((publisher, Some(channel)))
}

fn build_auth(config: &AuthConfig) -> Option<BearerAuth> {
    if !config.enabled {
        return None;
    }
    let verifier = StaticTokenVerifier::new(config.tokens.iter().cloned());
    Some(BearerAuth::new(Arc::new(verifier)))
}

/// Maps the telemetry section onto the telemetry crate's settings.
#[must_use]
pub fn telemetry_config(config: &PlanvaultConfig) -> TelemetryConfig {
    let section = &config.telemetry;
    let json = section.logging.format == LogFormat::Json;

    TelemetryConfig::builder()
        .service_name(&section.service_name)
        .service_version(env!("CARGO_PKG_VERSION"))
        .environment(&section.environment)
        .logging(LogConfig {
            enabled: section.logging.enabled,
            level: section.logging.level.clone(),
            json_format: json,
            span_events: false,
            file_line_info: section.logging.include_location,
            include_target: true,
            service_name: section.service_name.clone(),
        })
        .metrics(MetricsConfig {
            enabled: section.metrics.enabled,
            service_name: section.service_name.clone(),
            duration_buckets: section.metrics.histogram_buckets.clone(),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use planvault_core::fixtures::sample_plan;
    use std::io::Write;

    #[tokio::test]
    async fn test_build_defaults() {
        let config = PlanvaultConfig::default();
        let components = Components::build(&config).await.unwrap();
        assert_eq!(components.controller.resource_type(), "plan");
        assert!(components.publisher.is_some());
        assert!(components.auth.is_none());

        let created = components.controller.create(Some(sample_plan("p1"))).await.unwrap();
        assert_eq!(created.object_id, "p1");
        components.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_disabled_queue_and_auth() {
        let mut config = PlanvaultConfig::default();
        config.queue.backend = QueueBackend::Disabled;
        config.auth = AuthConfig {
            enabled: true,
            tokens: vec!["t0ken".to_string()],
        };
        config.plan.resource_type = "contract".to_string();

        let components = Components::build(&config).await.unwrap();
        assert!(components.publisher.is_none());
        assert!(components.auth.is_some());
        assert_eq!(components.controller.key("c1").as_str(), "contract_c1");
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_startup() {
        let mut config = PlanvaultConfig::default();
        config.store.backend = StoreBackend::Redis;
        config.store.redis.addr = "127.0.0.1:1".to_string();
        config.store.redis.timeout_ms = 200;

        let err = Components::build(&config).await.unwrap_err();
        assert!(matches!(err, ServerError::Store(_)));
    }

    #[test]
    fn test_custom_schema_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"type": "object", "required": ["objectId", "owner"]}}"#).unwrap();

        let validator = build_validator(&PlanConfig {
            resource_type: "plan".to_string(),
            schema_path: Some(file.path().display().to_string()),
        })
        .unwrap();
        assert!(validator.validate(&serde_json::json!({"objectId": "p1"})).is_err());
        assert!(validator
            .validate(&serde_json::json!({"objectId": "p1", "owner": "x"}))
            .is_ok());
    }

    #[test]
    fn test_missing_schema_file() {
        let err = build_validator(&PlanConfig {
            resource_type: "plan".to_string(),
            schema_path: Some("/nonexistent/schema.json".to_string()),
        })
        .err()
        .unwrap();
        assert!(matches!(err, ServerError::SchemaFile { .. }));
    }

    #[test]
    fn test_telemetry_mapping() {
        let config = PlanvaultConfig::development();
        let telemetry = telemetry_config(&config);
        assert!(!telemetry.logging.json_format);
        assert_eq!(telemetry.logging.level, "debug");
        assert_eq!(telemetry.environment, "development");
        assert_eq!(telemetry.metrics.service_name, "planvault");
    }
}

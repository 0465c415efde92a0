//! RabbitMQ sink.
//!
//! Publishes through the management plugin's HTTP API
//! (`POST /api/exchanges/{vhost}/{exchange}/publish`), which needs no AMQP
//! client. Each intent becomes one persistent message whose payload is the
//! intent's JSON text.

use std::time::Duration;

use async_trait::async_trait;
use planvault_core::IndexIntent;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::sink::IntentSink;

/// The management API's name for the nameless default exchange.
pub const DEFAULT_EXCHANGE: &str = "amq.default";

/// Settings for [`RabbitMqSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMqConfig {
    /// Base URL of the management API, e.g. `http://localhost:15672`.
    pub api_url: String,
    /// Virtual host.
    pub vhost: String,
    /// Exchange to publish to.
    pub exchange: String,
    /// Routing key for every intent.
    pub routing_key: String,
    /// Management API user.
    pub username: String,
    /// Management API password.
    pub password: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:15672".to_string(),
            vhost: "/".to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key: "plan-index".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: MessageProperties,
    routing_key: &'a str,
    payload: String,
    payload_encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct MessageProperties {
    content_type: &'static str,
    delivery_mode: u8,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

/// Publishes intents to a RabbitMQ exchange.
#[derive(Debug, Clone)]
pub struct RabbitMqSink {
    client: Client,
    publish_url: Url,
    config: RabbitMqConfig,
}

impl RabbitMqSink {
    /// Builds a sink, validating the API URL.
    pub fn new(config: RabbitMqConfig) -> Result<Self, SinkError> {
        let publish_url = publish_url(&config)?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            publish_url,
            config,
        })
    }

    /// The endpoint messages are posted to.
    #[must_use]
    pub fn publish_url(&self) -> &Url {
        &self.publish_url
    }
}

fn publish_url(config: &RabbitMqConfig) -> Result<Url, SinkError> {
    let mut url = Url::parse(&config.api_url)
        .map_err(|e| SinkError::Config(format!("{}: {e}", config.api_url)))?;
    url.path_segments_mut()
        .map_err(|()| SinkError::Config(format!("{} cannot be a base URL", config.api_url)))?
        .pop_if_empty()
        .extend([
            "api",
            "exchanges",
            config.vhost.as_str(),
            config.exchange.as_str(),
            "publish",
        ]);
    Ok(url)
}

#[async_trait]
impl IntentSink for RabbitMqSink {
    fn name(&self) -> &'static str {
        "rabbitmq"
    }

    async fn deliver(&self, intent: &IndexIntent) -> Result<(), SinkError> {
        let request = PublishRequest {
            properties: MessageProperties {
                content_type: "application/json",
                delivery_mode: 2,
            },
            routing_key: &self.config.routing_key,
            payload: serde_json::to_string(intent)?,
            payload_encoding: "string",
        };

        let response = self
            .client
            .post(self.publish_url.clone())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let PublishResponse { routed } = response.json().await?;
        if routed {
            Ok(())
        } else {
            Err(SinkError::Unroutable {
                exchange: self.config.exchange.clone(),
                routing_key: self.config.routing_key.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_url_encodes_vhost() {
        let sink = RabbitMqSink::new(RabbitMqConfig {
            api_url: "http://rabbit:15672/".to_string(),
            exchange: "plans".to_string(),
            ..RabbitMqConfig::default()
        })
        .unwrap();
        assert_eq!(
            sink.publish_url().as_str(),
            "http://rabbit:15672/api/exchanges/%2F/plans/publish"
        );
    }

    #[test]
    fn test_publish_url_keeps_prefix() {
        let sink = RabbitMqSink::new(RabbitMqConfig {
            api_url: "https://mq.internal/rabbit".to_string(),
            vhost: "plans".to_string(),
            ..RabbitMqConfig::default()
        })
        .unwrap();
        assert_eq!(
            sink.publish_url().as_str(),
            "https://mq.internal/rabbit/api/exchanges/plans/amq.default/publish"
        );
    }

    #[test]
    fn test_invalid_api_url() {
        let err = RabbitMqSink::new(RabbitMqConfig {
            api_url: "not a url".to_string(),
            ..RabbitMqConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }
}

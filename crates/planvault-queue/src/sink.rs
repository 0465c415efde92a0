//! Intent sinks.

use async_trait::async_trait;
use planvault_core::IndexIntent;

use crate::error::SinkError;

/// A destination for index intents.
#[async_trait]
pub trait IntentSink: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Delivers one intent.
    async fn deliver(&self, intent: &IndexIntent) -> Result<(), SinkError>;
}

/// Logs each intent at info level and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl IntentSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, intent: &IndexIntent) -> Result<(), SinkError> {
        let object_id = intent
            .body
            .get(planvault_core::OBJECT_ID)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        tracing::info!(
            operation = intent.operation.as_str(),
            object_id,
            "index intent"
        );
        Ok(())
    }
}

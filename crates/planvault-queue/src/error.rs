//! Delivery errors.

use thiserror::Error;

/// Errors raised by an [`IntentSink`](crate::IntentSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The broker could not be reached.
    #[error("broker request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The broker answered with a non-success status.
    #[error("broker rejected publish with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The message reached the exchange but no queue was bound to receive it.
    #[error("message to exchange '{exchange}' with routing key '{routing_key}' was not routed")]
    Unroutable {
        /// Target exchange.
        exchange: String,
        /// Routing key used.
        routing_key: String,
    },

    /// The intent could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sink is misconfigured.
    #[error("invalid sink configuration: {0}")]
    Config(String),
}

impl SinkError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Unroutable { .. } => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Json(_) | Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let server = SinkError::Rejected {
            status: 503,
            body: String::new(),
        };
        let client = SinkError::Rejected {
            status: 401,
            body: "not authorised".into(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!SinkError::Config("bad url".into()).is_retryable());
        assert!(SinkError::Unroutable {
            exchange: "plans".into(),
            routing_key: "index".into(),
        }
        .is_retryable());
    }
}

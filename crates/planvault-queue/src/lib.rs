//! # Planvault Queue
//!
//! Delivery of [`IndexIntent`](planvault_core::IndexIntent)s to the search
//! indexer's message broker.
//!
//! [`ChannelPublisher`] implements
//! [`IndexPublisher`](planvault_core::IndexPublisher): `publish` only enqueues
//! onto a bounded channel (dropping the intent when it is full), and a single background task hands intents to an
//! [`IntentSink`] one at a time, retrying failed deliveries with exponential
//! backoff. One task per publisher keeps delivery in publication order.
//!
//! Sinks:
//!
//! - [`RabbitMqSink`] - publishes through the RabbitMQ management HTTP API
//! - [`LogSink`] - logs intents, for development

#![doc(html_root_url = "https://docs.rs/planvault-queue/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod publisher;
mod rabbitmq;
mod sink;

pub use error::SinkError;
pub use publisher::{ChannelPublisher, DiscardPublisher, RetryPolicy};
pub use rabbitmq::{RabbitMqConfig, RabbitMqSink};
pub use sink::{IntentSink, LogSink};

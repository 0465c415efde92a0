//! # Planvault Server
//!
//! HTTP front end for the planvault service.
//!
//! This crate provides:
//!
//! - HTTP/1.1 serving via Hyper
//! - Routing for the plan endpoints and probes
//! - Optional bearer token authentication
//! - Request ids, body limits and handler timeouts
//! - Graceful shutdown with connection draining
//! - Bootstrap of the store, publisher and controller from configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use planvault_config::PlanvaultConfig;
//! use planvault_server::Components;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlanvaultConfig::development();
//!     let components = Components::build(&config).await?;
//!     components.server(&config).run().await?;
//!     components.shutdown().await;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/planvault-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
mod bootstrap;
mod error;
pub mod handlers;
mod health;
mod router;
mod server;
mod shutdown;

pub use auth::{AuthError, BearerAuth, StaticTokenVerifier, TokenVerifier};
pub use bootstrap::{telemetry_config, Components};
pub use error::ServerError;
pub use health::{HealthCheck, HealthStatus, ReadinessCheck, ReadinessStatus};
pub use router::{Operation, Resolution, RouteMatch, Router, OBJECT_ID_PARAM};
pub use server::{Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

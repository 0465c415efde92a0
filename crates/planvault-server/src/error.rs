//! Startup and serving errors.

use planvault_config::ConfigError;
use planvault_core::{SchemaError, StoreError};
use planvault_queue::SinkError;
use planvault_telemetry::TelemetryError;
use thiserror::Error;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address does not parse.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The schema file could not be read.
    #[error("failed to read schema file {path}: {source}")]
    SchemaFile {
        /// Configured schema path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The plan schema does not compile.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The store backend is unreachable.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The queue sink could not be built.
    #[error(transparent)]
    Queue(#[from] SinkError),
}

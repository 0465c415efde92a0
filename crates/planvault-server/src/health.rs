//! Liveness and readiness probes.
//!
//! - `/health` reports that the process is up, with service name, version
//!   and uptime.
//! - `/ready` reports whether the server should receive traffic. It turns
//!   false once shutdown begins, or when any registered check fails.
//!
//! ```rust
//! use planvault_server::{HealthCheck, ReadinessCheck};
//!
//! let health = HealthCheck::new("planvault", "0.1.0");
//! assert!(health.status().is_healthy());
//!
//! let readiness = ReadinessCheck::new().add_check("store", || true);
//! assert!(readiness.is_ready());
//! readiness.set_ready(false);
//! assert!(!readiness.is_ready());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    status: String,
    service: String,
    version: String,
    uptime_seconds: u64,
}

impl HealthStatus {
    /// Creates a healthy status.
    #[must_use]
    pub fn healthy(service: impl Into<String>, version: impl Into<String>, uptime: Duration) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.into(),
            version: version.into(),
            uptime_seconds: uptime.as_secs(),
        }
    }

    /// Returns whether the status is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Liveness probe.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    start_time: Instant,
}

impl HealthCheck {
    /// Creates a health check reporting `service` at `version`.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            start_time: Instant::now(),
        }
    }

    /// The server is healthy while it is running.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus::healthy(&self.service, &self.version, self.start_time.elapsed())
    }
}

/// Body of the `/ready` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessStatus {
    ready: bool,
    checks: BTreeMap<String, bool>,
}

impl ReadinessStatus {
    /// Returns whether the service is ready.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the result of a specific check.
    #[must_use]
    pub fn check(&self, name: &str) -> Option<bool> {
        self.checks.get(name).copied()
    }
}

type ReadinessCheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness probe.
///
/// Clones share the ready flag, so the server can flip it during shutdown.
#[derive(Clone)]
pub struct ReadinessCheck {
    checks: Vec<(String, ReadinessCheckFn)>,
    ready_override: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCheck")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("ready_override", &self.ready_override)
            .finish()
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessCheck {
    /// Creates a readiness check with no checks; it starts ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            ready_override: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Adds a named check that returns `true` when its component is ready.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Forces the ready flag, e.g. to `false` while draining.
    pub fn set_ready(&self, ready: bool) {
        self.ready_override.store(ready, Ordering::SeqCst);
    }

    /// Returns whether the flag is set and all checks pass.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready_override.load(Ordering::SeqCst) && self.checks.iter().all(|(_, check)| check())
    }

    /// Returns the full readiness status with individual check results.
    #[must_use]
    pub fn status(&self) -> ReadinessStatus {
        let checks: BTreeMap<String, bool> = self
            .checks
            .iter()
            .map(|(name, check)| (name.clone(), check()))
            .collect();
        let ready = self.ready_override.load(Ordering::SeqCst) && checks.values().all(|&v| v);

        ReadinessStatus { ready, checks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus::healthy("planvault", "1.2.3", Duration::from_secs(42));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "planvault");
        assert_eq!(json["uptime_seconds"], 42);
    }

    #[test]
    fn test_health_check() {
        let health = HealthCheck::new("planvault", "0.1.0");
        let status = health.status();
        assert!(status.is_healthy());
        assert_eq!(status.service(), "planvault");
        assert_eq!(status.version(), "0.1.0");
    }

    #[test]
    fn test_readiness_checks() {
        let flag = Arc::new(AtomicBool::new(true));
        let probe = Arc::clone(&flag);
        let readiness = ReadinessCheck::new()
            .add_check("store", move || probe.load(Ordering::SeqCst))
            .add_check("queue", || true);

        assert!(readiness.is_ready());
        flag.store(false, Ordering::SeqCst);
        let status = readiness.status();
        assert!(!status.is_ready());
        assert_eq!(status.check("store"), Some(false));
        assert_eq!(status.check("queue"), Some(true));
    }

    #[test]
    fn test_override_shared_between_clones() {
        let readiness = ReadinessCheck::new();
        let clone = readiness.clone();
        clone.set_ready(false);
        assert!(!readiness.is_ready());
        assert!(!readiness.status().is_ready());
    }
}

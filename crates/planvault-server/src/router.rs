//! Request routing and path matching.
//!
//! The router maps an HTTP method and path to an [`Operation`] and extracts
//! path parameters. Templates use `{name}` segments:
//!
//! ```rust
//! use http::Method;
//! use planvault_server::{Operation, Router};
//!
//! let router = Router::for_resource("plan");
//!
//! let m = router.match_route(&Method::GET, "/plan/12xvxc345ssdsds-508").unwrap();
//! assert_eq!(m.operation(), Operation::GetPlan);
//! assert_eq!(m.param("objectId"), Some("12xvxc345ssdsds-508"));
//! ```

use std::collections::HashMap;
use std::fmt;

use http::Method;

/// Path parameter carrying the plan identifier.
pub const OBJECT_ID_PARAM: &str = "objectId";

/// Every operation the server dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `GET /{resource}/{objectId}`
    GetPlan,
    /// `POST /{resource}`
    CreatePlan,
    /// `PUT /{resource}/{objectId}`
    ReplacePlan,
    /// `PATCH /{resource}/{objectId}`
    PatchPlan,
    /// `DELETE /{resource}/{objectId}`
    DeletePlan,
    /// `GET /health`
    Health,
    /// `GET /ready`
    Ready,
    /// `GET /metrics`
    Metrics,
}

impl Operation {
    /// Name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetPlan => "getPlan",
            Self::CreatePlan => "createPlan",
            Self::ReplacePlan => "replacePlan",
            Self::PatchPlan => "patchPlan",
            Self::DeletePlan => "deletePlan",
            Self::Health => "health",
            Self::Ready => "ready",
            Self::Metrics => "metrics",
        }
    }

    /// Whether the operation is served without authentication.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self, Self::Health | Self::Ready | Self::Metrics)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    operation: Operation,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the matched operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<PathSegment>,
    operation: Operation,
}

impl Route {
    fn new(method: Method, pattern: &str, operation: Operation) -> Self {
        Self {
            method,
            segments: parse_segments(pattern),
            operation,
        }
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path_segments) {
            match pattern {
                PathSegment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    // Segments that are not valid UTF-8 once decoded match nothing.
                    let decoded = urlencoding::decode(actual).ok()?;
                    params.insert(name.clone(), decoded.into_owned());
                }
            }
        }

        Some(params)
    }
}

fn parse_segments(pattern: &str) -> Vec<PathSegment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => PathSegment::Param(name.to_string()),
            None => PathSegment::Literal(s.to_string()),
        })
        .collect()
}

/// Outcome of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A route matched.
    Matched(RouteMatch),
    /// The path exists but not for this method.
    MethodNotAllowed,
    /// No route has this path.
    NotFound,
}

/// HTTP request router.
///
/// Routes are checked in registration order; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The service's route table for `resource_type`, plus the probe and
    /// metrics routes.
    #[must_use]
    pub fn for_resource(resource_type: &str) -> Self {
        let collection = format!("/{resource_type}");
        let item = format!("/{resource_type}/{{{OBJECT_ID_PARAM}}}");

        let mut router = Self::new();
        router.add_route(Method::GET, "/health", Operation::Health);
        router.add_route(Method::GET, "/ready", Operation::Ready);
        router.add_route(Method::GET, "/metrics", Operation::Metrics);
        router.add_route(Method::POST, &collection, Operation::CreatePlan);
        router.add_route(Method::GET, &item, Operation::GetPlan);
        router.add_route(Method::PUT, &item, Operation::ReplacePlan);
        router.add_route(Method::PATCH, &item, Operation::PatchPlan);
        router.add_route(Method::DELETE, &item, Operation::DeletePlan);
        router
    }

    /// Adds a route.
    pub fn add_route(&mut self, method: Method, pattern: impl AsRef<str>, operation: Operation) {
        self.routes.push(Route::new(method, pattern.as_ref(), operation));
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Matches a request to a route.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.match_path(path).map(|params| RouteMatch {
                    operation: route.operation,
                    params,
                })
            })
    }

    /// Matches a request, distinguishing unknown paths from wrong methods.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        if let Some(route_match) = self.match_route(method, path) {
            return Resolution::Matched(route_match);
        }
        if self.routes.iter().any(|route| route.match_path(path).is_some()) {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }
}

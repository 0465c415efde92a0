//! HTTP server implementation.
//!
//! Built on Hyper and Tokio:
//!
//! - TCP listener bound to the configured address
//! - One task per connection (HTTP/1.1)
//! - Routing via the [`Router`]
//! - Bearer auth, body limit and request timeout per request
//! - Graceful shutdown with connection draining
//!
//! # Example
//!
//! ```rust,no_run
//! use planvault_core::fixtures::memory_controller;
//! use planvault_server::Server;
//!
//! # async fn run() -> Result<(), planvault_server::ServerError> {
//! let (controller, _) = memory_controller();
//! let server = Server::builder(controller).build();
//! server.run().await
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use planvault_config::ServerConfig;
use planvault_core::{PlanController, PlanError, RequestContext, RequestId};
use planvault_telemetry::metrics::{
    record_auth_failure, record_request, record_validation_failure, render_metrics, InFlightGuard,
};
use planvault_telemetry::{log_request_complete, log_request_error, log_request_start};
use tokio::net::{TcpListener, TcpStream};

use crate::auth::BearerAuth;
use crate::error::ServerError;
use crate::handlers::{
    dispatch, error_response, json_response, plan_error_response, HttpResponse, REQUEST_ID_HEADER,
};
use crate::health::{HealthCheck, ReadinessCheck};
use crate::router::{Operation, Resolution, Router, OBJECT_ID_PARAM};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Label for requests that matched no route.
const UNROUTED: &str = "unrouted";

/// The planvault HTTP server.
pub struct Server {
    config: ServerConfig,
    router: Router,
    controller: PlanController,
    auth: Option<BearerAuth>,
    health: HealthCheck,
    readiness: ReadinessCheck,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("controller", &self.controller)
            .field("auth", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a builder serving `controller`.
    #[must_use]
    pub fn builder(controller: PlanController) -> ServerBuilder {
        ServerBuilder::new(controller)
    }

    /// Returns the readiness probe; clones share its state.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .config
            .http_addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.http_addr.clone()))?;

        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// fires, then drains open connections.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        if let Ok(local) = listener.local_addr() {
            tracing::info!(addr = %local, "server listening");
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();
        let max_connections = usize::try_from(server.config.max_connections).unwrap_or(usize::MAX);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            if tracker.active_connections() >= max_connections {
                                tracing::warn!(%remote_addr, max_connections, "connection limit reached, refusing connection");
                                drop(stream);
                                continue;
                            }
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, shutdown).await {
                                    tracing::debug!(%remote_addr, error = %e, "connection error");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        server.readiness.set_ready(false);

        let shutdown_timeout = Duration::from_secs(server.config.shutdown_timeout_secs);
        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = server.config.shutdown_timeout_secs,
            "draining connections"
        );

        tokio::select! {
            () = tracker.wait_for_shutdown() => {
                tracing::info!("all connections closed");
            }
            () = tokio::time::sleep(shutdown_timeout) => {
                tracing::warn!(
                    active = tracker.active_connections(),
                    "shutdown timeout reached with connections still open"
                );
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(req).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => return result,
            () = shutdown.recv() => {}
        }
        conn.as_mut().graceful_shutdown();
        conn.await
    }

    /// Handles one request end to end.
    pub(crate) async fn handle_request<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let _in_flight = InFlightGuard::new();

        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_default();
        let mut ctx = RequestContext::with_request_id(request_id);
        log_request_start!(request_id, req.method(), req.uri().path());

        let mut response = self.route(&mut ctx, req).await;

        let status = response.status().as_u16();
        let operation = ctx.operation().unwrap_or(UNROUTED);
        let elapsed = ctx.elapsed();
        record_request(operation, status, elapsed);
        log_request_complete!(
            request_id,
            operation,
            status,
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        );

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }

    async fn route<B>(&self, ctx: &mut RequestContext, req: Request<B>) -> HttpResponse
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let request_id = ctx.request_id().to_string();
        let rid = Some(request_id.as_str());

        let route_match = match self.router.resolve(req.method(), req.uri().path()) {
            Resolution::Matched(route_match) => route_match,
            Resolution::MethodNotAllowed => {
                return error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "METHOD_NOT_ALLOWED",
                    format!("{} is not supported on {}", req.method(), req.uri().path()),
                    rid,
                );
            }
            Resolution::NotFound => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    "ROUTE_NOT_FOUND",
                    format!("No route for {}", req.uri().path()),
                    rid,
                );
            }
        };

        let operation = route_match.operation();
        ctx.set_operation(operation.as_str());

        match operation {
            Operation::Health => return json_response(StatusCode::OK, &self.health.status(), None),
            Operation::Ready => {
                let status = self.readiness.status();
                let code = if status.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                return json_response(code, &status, None);
            }
            Operation::Metrics => return metrics_response(rid),
            _ => {}
        }

        if let Some(auth) = &self.auth {
            match auth.authenticate(req.headers()).await {
                Ok(subject) => ctx.set_subject(subject),
                Err(e) => {
                    record_auth_failure(e.reason());
                    tracing::info!(request_id = %request_id, reason = e.reason(), "request rejected by auth gate");
                    return error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string(), rid);
                }
            }
        }

        let request_timeout = Duration::from_millis(self.config.request_timeout_ms);
        let (parts, body) = req.into_parts();

        let limited = Limited::new(body, self.config.max_body_bytes);
        let body = match tokio::time::timeout(request_timeout, limited.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    return error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "PAYLOAD_TOO_LARGE",
                        format!("Request body exceeds {} bytes", self.config.max_body_bytes),
                        rid,
                    );
                }
                tracing::warn!(request_id = %request_id, error = %e, "failed to read request body");
                return error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT", "Invalid body!", rid);
            }
            Err(_) => {
                return error_response(
                    StatusCode::REQUEST_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    "Request body collection timed out",
                    rid,
                );
            }
        };

        let object_id = route_match.param(OBJECT_ID_PARAM);
        let call = dispatch(&self.controller, operation, object_id, &parts.headers, &body);
        let outcome = tokio::time::timeout(request_timeout, AssertUnwindSafe(call).catch_unwind()).await;

        match outcome {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(err))) => {
                if let PlanError::InvalidInput { details, .. } = &err {
                    if !details.is_empty() {
                        record_validation_failure(operation.as_str());
                    }
                }
                if matches!(err, PlanError::Unexpected { .. }) {
                    log_request_error!(request_id, err);
                } else {
                    tracing::info!(request_id = %request_id, code = err.code(), error = %err, "request refused");
                }
                plan_error_response(&err, rid)
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(request_id = %request_id, operation = operation.as_str(), panic = %message, "handler panicked");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Something went wrong!!",
                    rid,
                )
            }
            Err(_) => {
                tracing::warn!(request_id = %request_id, operation = operation.as_str(), "handler timed out");
                error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "HANDLER_TIMEOUT",
                    "Handler execution timed out",
                    rid,
                )
            }
        }
    }
}

fn metrics_response(request_id: Option<&str>) -> HttpResponse {
    match render_metrics() {
        Some(text) => {
            let mut response = Response::new(Full::new(Bytes::from(text)));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "METRICS_DISABLED",
            "Metrics are not enabled",
            request_id,
        ),
    }
}

/// Builder for [`Server`].
#[derive(Debug)]
pub struct ServerBuilder {
    controller: PlanController,
    config: ServerConfig,
    auth: Option<BearerAuth>,
    service_name: String,
    service_version: String,
    readiness: ReadinessCheck,
}

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new(controller: PlanController) -> Self {
        Self {
            controller,
            config: ServerConfig::default(),
            auth: None,
            service_name: "planvault".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            readiness: ReadinessCheck::new(),
        }
    }

    /// Sets the listener, timeout and body limit settings.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Requires bearer authentication on plan routes.
    #[must_use]
    pub fn auth(mut self, auth: BearerAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the name and version reported by `/health`.
    #[must_use]
    pub fn service(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.service_name = name.into();
        self.service_version = version.into();
        self
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = readiness;
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            router: Router::for_resource(self.controller.resource_type()),
            controller: self.controller,
            config: self.config,
            auth: self.auth,
            health: HealthCheck::new(self.service_name, self.service_version),
            readiness: self.readiness,
        }
    }
}

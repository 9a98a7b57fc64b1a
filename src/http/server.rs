//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID)
//! - Serve connections handed over by the demultiplexer

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::broker::TopicRegistry;
use crate::config::HttpConfig;
use crate::http::handlers;
use crate::http::request::X_REQUEST_ID;
use crate::net::HttpIncoming;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TopicRegistry>,
}

/// HTTP side of the broker.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server publishing into `registry`.
    pub fn new(config: &HttpConfig, registry: Arc<TopicRegistry>) -> Self {
        let state = AppState { registry };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &HttpConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/publish", post(handlers::publish))
            .route("/status", get(handlers::status))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    /// The configured router, for serving elsewhere or testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve connections from `incoming` until `shutdown` resolves.
    pub async fn run<F>(self, incoming: HttpIncoming, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = axum::serve::Listener::local_addr(&incoming)?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(incoming, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

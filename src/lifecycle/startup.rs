//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the shared listener
//! - Build the registry, then the demultiplexer, then both protocol sides
//! - Hand back a handle that can observe and stop the running broker
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The registry is created here and passed to both sides explicitly

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::broker::{self, TopicRegistry};
use crate::config::BrokerConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::listener::ListenerError;
use crate::net::{DemuxError, Demultiplexer, Listener, SessionTracker};

/// Error type for startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Failed to start demultiplexer: {0}")]
    Demux(std::io::Error),
}

/// A running broker.
pub struct Broker {
    registry: Arc<TopicRegistry>,
    demux: Demultiplexer,
    shutdown: Shutdown,
    sessions: SessionTracker,
    http_task: JoinHandle<std::io::Result<()>>,
    session_task: JoinHandle<DemuxError>,
}

/// Bind the configured address and start serving.
pub async fn start(config: &BrokerConfig) -> Result<Broker, StartupError> {
    let listener = Listener::bind(&config.listener).await?;
    start_on(listener, config)
}

/// Start serving on an already bound listener. Must run inside a Tokio runtime.
pub fn start_on(listener: Listener, config: &BrokerConfig) -> Result<Broker, StartupError> {
    let registry = Arc::new(TopicRegistry::with_config(&config.broker));
    let demux = Demultiplexer::spawn(listener, &config.sniff).map_err(StartupError::Demux)?;
    let shutdown = Shutdown::new();
    let sessions = SessionTracker::new();

    let server = HttpServer::new(&config.http, registry.clone());
    let http_task = tokio::spawn(server.run(demux.http_incoming(), shutdown.signalled()));
    let session_task = tokio::spawn(broker::serve(
        demux.clone(),
        registry.clone(),
        sessions.clone(),
    ));

    tracing::info!(address = %demux.local_addr(), "Broker started");

    Ok(Broker {
        registry,
        demux,
        shutdown,
        sessions,
        http_task,
        session_task,
    })
}

impl Broker {
    /// Address both protocols are served on.
    pub fn local_addr(&self) -> SocketAddr {
        self.demux.local_addr()
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Resolve when the listener stops, with the reason.
    pub async fn closed(&self) -> DemuxError {
        self.demux.closed().await
    }

    /// Stop accepting, drain HTTP, and wait for both accept loops to end.
    ///
    /// Subscriber sessions already running are left to end with their connections.
    pub async fn stop(self) {
        self.demux.close();
        self.shutdown.trigger();

        match self.http_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
            Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
        }
        match self.session_task.await {
            Ok(reason) => tracing::info!(reason = %reason, "Session accept loop ended"),
            Err(e) => tracing::error!(error = %e, "Session accept loop panicked"),
        }
        tracing::info!(
            live_sessions = self.sessions.active_count(),
            topics = self.registry.topic_count(),
            "Broker stopped"
        );
    }
}

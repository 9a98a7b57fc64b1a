//! Single-socket protocol demultiplexer.
//!
//! # Responsibilities
//! - Own the accept loop of the shared listening socket
//! - Sniff each connection once and route it to the HTTP or raw side
//! - Broadcast the terminal listener error to every waiter on both sides
//!
//! # State Machine
//! ```text
//! Running ──accept ok──▶ Running   (read → classify → hand off)
//! Running ──accept err / close()──▶ Closed(err)
//! ```
//!
//! # Design Decisions
//! - Each side is a single-slot `mpsc` queue; routing waits for room, so a
//!   stalled consumer on either side stalls accepts for both
//! - The terminal state lives in a `watch` channel: every current and future
//!   waiter observes the same error and nobody hangs
//! - Per-connection sniff failures drop that connection only

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};

use crate::config::SniffConfig;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::peekable::PeekableStream;
use crate::net::sniff::{self, Protocol};
use crate::observability::metrics;

/// Terminal error observed by every waiter once the demultiplexer stops.
#[derive(Debug, Clone, Error)]
pub enum DemuxError {
    /// `close()` was called.
    #[error("listener closed")]
    Closed,
    /// The underlying accept call failed.
    #[error("accept failed: {0}")]
    Accept(Arc<io::Error>),
}

/// A connection handed to one side, or the error that stopped the listener.
pub type PendingConnection = Result<(PeekableStream<TcpStream>, SocketAddr), DemuxError>;

#[derive(Debug, Clone)]
enum DemuxState {
    Running,
    Closed(DemuxError),
}

type Handoff = Mutex<mpsc::Receiver<(PeekableStream<TcpStream>, SocketAddr)>>;

struct Shared {
    http: Handoff,
    raw: Handoff,
    state: watch::Sender<DemuxState>,
    local_addr: SocketAddr,
}

/// Source of freshly accepted connections for the accept loop.
pub trait Accept: Send + Sync + 'static {
    fn accept_connection(
        &self,
    ) -> impl Future<Output = Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Accept for Listener {
    fn accept_connection(
        &self,
    ) -> impl Future<Output = Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError>> + Send
    {
        self.accept()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Listener::local_addr(self)
    }
}

/// Splits one listening socket into an HTTP connection source and a raw one.
///
/// Cheap to clone; all clones share the same accept loop.
#[derive(Clone)]
pub struct Demultiplexer {
    shared: Arc<Shared>,
}

impl Demultiplexer {
    /// Start the accept loop on `listener`.
    pub fn spawn<A: Accept>(listener: A, sniff: &SniffConfig) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (http_tx, http_rx) = mpsc::channel(1);
        let (raw_tx, raw_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(DemuxState::Running);

        let shared = Arc::new(Shared {
            http: Mutex::new(http_rx),
            raw: Mutex::new(raw_rx),
            state,
            local_addr,
        });

        let accept_loop = AcceptLoop {
            listener,
            window: sniff.window_bytes,
            read_timeout: Duration::from_millis(sniff.read_timeout_ms),
            http_tx,
            raw_tx,
            state: shared.state.subscribe(),
        };
        let demux = Self { shared };
        let closer = demux.clone();
        tokio::spawn(async move {
            if let Some(err) = accept_loop.run().await {
                closer.shutdown_with(err);
            }
            tracing::info!(address = %local_addr, "Demultiplexer stopped accepting");
        });

        Ok(demux)
    }

    /// Address of the shared listening socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Wait for the next HTTP connection.
    pub async fn accept_http(&self) -> PendingConnection {
        self.accept_from(&self.shared.http).await
    }

    /// Wait for the next non-HTTP connection.
    pub async fn accept_raw(&self) -> PendingConnection {
        self.accept_from(&self.shared.raw).await
    }

    /// Stop accepting. Every waiter on either side receives [`DemuxError::Closed`].
    pub fn close(&self) {
        self.shutdown_with(DemuxError::Closed);
    }

    /// Resolve once the demultiplexer has stopped, with the terminal error.
    pub async fn closed(&self) -> DemuxError {
        let mut state = self.shared.state.subscribe();
        let result = state
            .wait_for(|s| matches!(s, DemuxState::Closed(_)))
            .await
            .map(|s| s.clone());
        match result {
            Ok(DemuxState::Closed(err)) => err,
            _ => DemuxError::Closed,
        }
    }

    /// An HTTP connection source for `axum::serve`.
    pub fn http_incoming(&self) -> HttpIncoming {
        HttpIncoming {
            demux: self.clone(),
        }
    }

    fn shutdown_with(&self, err: DemuxError) {
        let changed = self.shared.state.send_if_modified(|state| match state {
            DemuxState::Running => {
                *state = DemuxState::Closed(err.clone());
                true
            }
            DemuxState::Closed(_) => false,
        });
        if changed {
            tracing::warn!(error = %err, "Listener terminated");
        }
    }

    async fn accept_from(&self, handoff: &Handoff) -> PendingConnection {
        let mut rx = tokio::select! {
            guard = handoff.lock() => guard,
            err = self.closed() => return Err(err),
        };
        tokio::select! {
            biased;
            conn = rx.recv() => match conn {
                Some(conn) => Ok(conn),
                // Queue closes just before the terminal state is published.
                None => Err(self.closed().await),
            },
            err = self.closed() => Err(err),
        }
    }
}

/// The accept task's half of the demultiplexer.
struct AcceptLoop<A> {
    listener: A,
    window: usize,
    read_timeout: Duration,
    http_tx: mpsc::Sender<(PeekableStream<TcpStream>, SocketAddr)>,
    raw_tx: mpsc::Sender<(PeekableStream<TcpStream>, SocketAddr)>,
    state: watch::Receiver<DemuxState>,
}

impl<A: Accept> AcceptLoop<A> {
    /// Runs until close is requested (`None`) or accept fails (`Some`).
    /// Dropping `self` on return closes the socket and both queues.
    async fn run(mut self) -> Option<DemuxError> {
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept_connection() => accepted,
                _ = stopped(&mut self.state) => return None,
            };

            let (mut stream, peer_addr, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Accept(e)) | Err(ListenerError::Bind(e)) => {
                    tracing::error!(error = %e, "Accept failed");
                    return Some(DemuxError::Accept(Arc::new(e)));
                }
            };

            let read = tokio::select! {
                read = sniff::read_prefix(&mut stream, self.window, self.read_timeout) => read,
                _ = stopped(&mut self.state) => return None,
            };
            let prefix = match read {
                Ok(prefix) => prefix,
                Err(e) => {
                    tracing::warn!(peer_addr = %peer_addr, error = %e, "Failed to read from new connection");
                    metrics::record_sniff_failure();
                    continue;
                }
            };

            let protocol = sniff::classify(&prefix);
            let conn = PeekableStream::new(stream, prefix).with_permit(permit);
            tracing::debug!(
                connection_id = %conn.id(),
                peer_addr = %peer_addr,
                protocol = protocol.as_str(),
                "Connection classified"
            );
            metrics::record_connection(protocol.as_str());

            let tx = match protocol {
                Protocol::Http => &self.http_tx,
                Protocol::Raw => &self.raw_tx,
            };
            tokio::select! {
                sent = tx.send((conn, peer_addr)) => {
                    if sent.is_err() {
                        return None;
                    }
                }
                _ = stopped(&mut self.state) => return None,
            }
        }
    }
}

async fn stopped(state: &mut watch::Receiver<DemuxState>) {
    let _ = state.wait_for(|s| matches!(s, DemuxState::Closed(_))).await;
}

/// HTTP side of a [`Demultiplexer`], usable as an `axum::serve` listener.
///
/// axum's accept loop cannot observe errors, so once the demultiplexer stops
/// this source parks forever; pair it with a graceful shutdown signal.
pub struct HttpIncoming {
    demux: Demultiplexer,
}

impl axum::serve::Listener for HttpIncoming {
    type Io = PeekableStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.demux.accept_http().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "HTTP connection source closed");
                std::future::pending().await
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.demux.local_addr())
    }
}

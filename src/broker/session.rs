//! Line-oriented subscriber sessions.
//!
//! # Wire Protocol
//! ```text
//! client → broker:  <topic>\n   (one per line, repeated lines ignored)
//! broker → client:  <message>\n (one per delivered publish)
//! ```
//!
//! A session lives until its connection errors or closes. On the way out it
//! releases every topic it is still the only subscriber of, in subscription
//! order, then closes the connection. Lines that are not UTF-8 are skipped.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};

use crate::broker::registry::{Subscriber, TopicRegistry};
use crate::net::{ConnectionId, DemuxError, Demultiplexer, SessionTracker};

/// Serve one subscriber connection to completion.
pub async fn run_session<S>(stream: S, id: ConnectionId, registry: Arc<TopicRegistry>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let subscriber = Subscriber::new(id, write_half);
    let mut reader = BufReader::new(read_half);
    let mut topics: Vec<String> = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                tracing::debug!(connection_id = %id, "Subscriber disconnected");
                break;
            }
            Ok(_) if line.last() != Some(&b'\n') => {
                tracing::debug!(connection_id = %id, "Subscriber disconnected mid-line");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Subscriber read failed");
                break;
            }
        }

        let topic = match std::str::from_utf8(&line) {
            Ok(text) => text.trim(),
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Ignoring topic line that is not UTF-8");
                continue;
            }
        };
        if topic.is_empty() {
            continue;
        }
        if topics.iter().any(|seen| seen == topic) {
            tracing::debug!(connection_id = %id, topic, "Already subscribed");
            continue;
        }
        topics.push(topic.to_string());
        registry.subscribe(topic, subscriber.clone());
    }

    for topic in &topics {
        registry.release(topic, id);
    }
    if let Err(e) = subscriber.close().await {
        tracing::trace!(connection_id = %id, error = %e, "Shutdown after session failed");
    }
}

/// Accept raw connections from `demux` and run a session for each.
///
/// Returns the terminal listener error once the demultiplexer stops.
pub async fn serve(
    demux: Demultiplexer,
    registry: Arc<TopicRegistry>,
    tracker: SessionTracker,
) -> DemuxError {
    loop {
        let (mut stream, peer_addr) = match demux.accept_raw().await {
            Ok(conn) => conn,
            Err(e) => return e,
        };
        let id = stream.id();
        tracing::info!(connection_id = %id, peer_addr = %peer_addr, "Subscriber session started");

        // The registry may outlive the session; the slot must not.
        let permit = stream.take_permit();
        let guard = tracker.track(id);
        let registry = registry.clone();
        tokio::spawn(async move {
            run_session(stream, id, registry).await;
            drop(permit);
            drop(guard);
        });
    }
}

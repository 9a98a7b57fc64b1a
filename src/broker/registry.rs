//! Topic registry.
//!
//! # Responsibilities
//! - Map topic names to the connections subscribed to them
//! - Deliver a published message to one randomly chosen subscriber
//!
//! # Design Decisions
//! - `DashMap` entry API makes get-or-create-then-append a single locked step,
//!   so concurrent subscribes to one topic never lose an update
//! - Unsubscribe forgets the whole topic; `release` does so only when the
//!   releasing connection is the sole subscriber
//! - Delivery failures are logged, never surfaced to the publisher, and never
//!   evict the subscriber
//! - A subscriber whose session ended stays listed but holds no socket; writes
//!   to it fail with `NotConnected`
//! - No map guard is held across an await

use std::io;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::config::DeliveryConfig;
use crate::net::ConnectionId;
use crate::observability::metrics;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of a subscribed connection.
///
/// Clones share the same underlying writer. Once [`Subscriber::close`] runs the
/// writer is dropped for every clone.
#[derive(Clone)]
pub struct Subscriber {
    id: ConnectionId,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
}

impl Subscriber {
    pub fn new<W>(id: ConnectionId, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Write `message` followed by a newline.
    pub async fn send_line(&self, message: &str) -> io::Result<()> {
        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "subscriber connection closed")
        })?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }

    /// Shut the connection down and drop the writer.
    ///
    /// Later sends from any clone fail with `NotConnected`. Closing twice is a no-op.
    pub async fn close(&self) -> io::Result<()> {
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Result of a publish call. Informational only; publishing never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message was written to this subscriber.
    Delivered(ConnectionId),
    /// Nobody is subscribed to the topic.
    NoSubscribers,
    /// The write to this subscriber failed or timed out.
    Failed(ConnectionId),
}

impl PublishOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Delivered(_) => "delivered",
            PublishOutcome::NoSubscribers => "no_subscribers",
            PublishOutcome::Failed(_) => "failed",
        }
    }
}

/// Concurrent topic → subscribers map.
#[derive(Debug)]
pub struct TopicRegistry {
    topics: DashMap<String, Vec<Subscriber>>,
    publish_timeout: Duration,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::with_config(&DeliveryConfig::default())
    }

    pub fn with_config(config: &DeliveryConfig) -> Self {
        Self {
            topics: DashMap::new(),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        }
    }

    /// Append `subscriber` to `topic`, creating the topic if needed.
    ///
    /// No duplicate check; callers dedupe.
    pub fn subscribe(&self, topic: &str, subscriber: Subscriber) {
        let id = subscriber.id();
        let subscribers = {
            let mut entry = self.topics.entry(topic.to_string()).or_default();
            entry.push(subscriber);
            entry.len()
        };
        metrics::set_topics(self.topics.len());
        tracing::debug!(topic, connection_id = %id, subscribers, "Subscribed");
    }

    /// Forget `topic` and every subscriber it had.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let removed = self.topics.remove(topic).is_some();
        if removed {
            metrics::set_topics(self.topics.len());
            tracing::debug!(topic, "Unsubscribed topic");
        }
        removed
    }

    /// Forget `topic` only if `id` is its one and only subscriber.
    pub fn release(&self, topic: &str, id: ConnectionId) -> bool {
        let removed = self
            .topics
            .remove_if(topic, |_, subscribers| {
                matches!(subscribers.as_slice(), [only] if only.id() == id)
            })
            .is_some();
        if removed {
            metrics::set_topics(self.topics.len());
            tracing::debug!(topic, connection_id = %id, "Released topic");
        }
        removed
    }

    /// Deliver `message` to one random subscriber of `topic`.
    pub async fn publish(&self, topic: &str, message: &str) -> PublishOutcome {
        let outcome = match self.pick(topic) {
            None => {
                tracing::debug!(topic, "No subscriber for topic");
                PublishOutcome::NoSubscribers
            }
            Some(subscriber) => {
                let id = subscriber.id();
                match tokio::time::timeout(self.publish_timeout, subscriber.send_line(message)).await {
                    Ok(Ok(())) => {
                        tracing::debug!(topic, connection_id = %id, "Published");
                        PublishOutcome::Delivered(id)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(topic, connection_id = %id, error = %e, "Publish failed");
                        PublishOutcome::Failed(id)
                    }
                    Err(_) => {
                        tracing::warn!(
                            topic,
                            connection_id = %id,
                            timeout_ms = self.publish_timeout.as_millis() as u64,
                            "Publish timed out"
                        );
                        PublishOutcome::Failed(id)
                    }
                }
            }
        };
        metrics::record_publish(outcome.as_str());
        outcome
    }

    fn pick(&self, topic: &str) -> Option<Subscriber> {
        let subscribers = self.topics.get(topic)?;
        if subscribers.is_empty() {
            return None;
        }
        Some(subscribers[fastrand::usize(..subscribers.len())].clone())
    }

    /// Number of topics with at least one subscription.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Number of subscribers recorded under `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Sum of subscribers across all topics.
    pub fn total_subscribers(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    /// Current topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn subscriber(capacity: usize) -> (Subscriber, DuplexStream) {
        let (local, remote) = tokio::io::duplex(capacity);
        (Subscriber::new(ConnectionId::new(), local), remote)
    }

    #[tokio::test]
    async fn sole_subscriber_receives_message_line() {
        let registry = TopicRegistry::new();
        let (sub, mut remote) = subscriber(1024);
        let id = sub.id();
        registry.subscribe("orders", sub);

        assert_eq!(
            registry.publish("orders", "hello").await,
            PublishOutcome::Delivered(id)
        );

        let mut buf = [0u8; 6];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
    }

    #[tokio::test]
    async fn publish_after_unsubscribe_is_noop() {
        let registry = TopicRegistry::new();
        let (sub, mut remote) = subscriber(1024);
        registry.subscribe("orders", sub.clone());

        assert!(registry.unsubscribe("orders"));
        assert!(!registry.unsubscribe("orders"));
        assert_eq!(
            registry.publish("orders", "hello").await,
            PublishOutcome::NoSubscribers
        );

        sub.close().await.unwrap();
        let mut out = Vec::new();
        remote.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn closed_subscriber_fails_publish_and_releases_writer() {
        let registry = TopicRegistry::new();
        let (sub, mut remote) = subscriber(64);
        let id = sub.id();
        registry.subscribe("orders", sub.clone());

        sub.close().await.unwrap();
        sub.close().await.unwrap();

        let mut out = Vec::new();
        remote.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(
            registry.publish("orders", "hello").await,
            PublishOutcome::Failed(id)
        );
        assert_eq!(registry.subscriber_count("orders"), 1);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_is_noop() {
        let registry = TopicRegistry::new();
        assert_eq!(
            registry.publish("nobody", "hello").await,
            PublishOutcome::NoSubscribers
        );
    }

    #[tokio::test]
    async fn unsubscribe_drops_every_subscriber() {
        let registry = TopicRegistry::new();
        let (a, _ra) = subscriber(64);
        let (b, _rb) = subscriber(64);
        registry.subscribe("orders", a);
        registry.subscribe("orders", b);
        assert_eq!(registry.subscriber_count("orders"), 2);

        registry.unsubscribe("orders");
        assert_eq!(registry.subscriber_count("orders"), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[tokio::test]
    async fn release_only_removes_sole_owner() {
        let registry = TopicRegistry::new();
        let (a, _ra) = subscriber(64);
        let (b, _rb) = subscriber(64);
        let (a_id, b_id) = (a.id(), b.id());

        registry.subscribe("solo", a.clone());
        assert!(!registry.release("solo", b_id));
        assert!(registry.release("solo", a_id));
        assert_eq!(registry.topic_count(), 0);

        registry.subscribe("shared", a);
        registry.subscribe("shared", b);
        assert!(!registry.release("shared", a_id));
        assert_eq!(registry.subscriber_count("shared"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribes_are_not_lost() {
        let registry = Arc::new(TopicRegistry::new());
        let mut handles = Vec::new();
        let mut remotes = Vec::new();
        for _ in 0..64 {
            let (sub, remote) = subscriber(64);
            remotes.push(remote);
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.subscribe("hot", sub);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.subscriber_count("hot"), 64);
        assert_eq!(registry.total_subscribers(), 64);
    }

    #[tokio::test]
    async fn delivery_is_spread_evenly_between_two_subscribers() {
        let registry = TopicRegistry::new();
        let (a, _ra) = subscriber(1 << 16);
        let (b, _rb) = subscriber(1 << 16);
        let (a_id, b_id) = (a.id(), b.id());
        registry.subscribe("orders", a);
        registry.subscribe("orders", b);

        let mut counts: HashMap<ConnectionId, usize> = HashMap::new();
        for _ in 0..2000 {
            match registry.publish("orders", "m").await {
                PublishOutcome::Delivered(id) => *counts.entry(id).or_default() += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        let a_share = counts[&a_id] as f64 / 2000.0;
        let b_share = counts[&b_id] as f64 / 2000.0;
        assert!((0.4..0.6).contains(&a_share), "a share {a_share}");
        assert!((0.4..0.6).contains(&b_share), "b share {b_share}");
    }

    #[tokio::test]
    async fn failed_write_is_swallowed_and_subscriber_kept() {
        let registry = TopicRegistry::new();
        let (sub, remote) = subscriber(64);
        let id = sub.id();
        registry.subscribe("orders", sub);
        drop(remote);

        assert_eq!(
            registry.publish("orders", "hello").await,
            PublishOutcome::Failed(id)
        );
        assert_eq!(registry.subscriber_count("orders"), 1);
    }

    #[tokio::test]
    async fn stalled_subscriber_times_out() {
        let registry = TopicRegistry::with_config(&DeliveryConfig {
            publish_timeout_ms: 50,
        });
        let (sub, _remote) = subscriber(4);
        let id = sub.id();
        registry.subscribe("orders", sub);

        assert_eq!(
            registry.publish("orders", "a message longer than the pipe").await,
            PublishOutcome::Failed(id)
        );
    }

    #[test]
    fn topics_are_listed_sorted() {
        let registry = TopicRegistry::new();
        let (_, w1) = tokio::io::duplex(8);
        let (_, w2) = tokio::io::duplex(8);
        registry.subscribe("fills", Subscriber::new(ConnectionId::new(), w1));
        registry.subscribe("alerts", Subscriber::new(ConnectionId::new(), w2));
        assert_eq!(registry.topics(), vec!["alerts".to_string(), "fills".to_string()]);
    }
}

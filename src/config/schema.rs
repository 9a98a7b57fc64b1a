//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the broker.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Protocol sniffing settings.
    pub sniff: SniffConfig,

    /// Embedded HTTP server settings.
    pub http: HttpConfig,

    /// Topic delivery settings.
    pub broker: DeliveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Settings for classifying freshly accepted connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SniffConfig {
    /// Maximum number of bytes read once to classify a connection.
    /// HTTP request heads larger than this are classified as raw.
    pub window_bytes: usize,

    /// How long the accept loop waits for a new connection's first bytes.
    ///
    /// Classification runs inline in the accept loop, so a client that sends
    /// nothing holds up every other accept, HTTP and raw alike, for up to this
    /// long. Keep it short on ports exposed to untrusted peers.
    pub read_timeout_ms: u64,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            window_bytes: crate::net::sniff::DEFAULT_SNIFF_WINDOW,
            read_timeout_ms: 10_000,
        }
    }
}

/// Embedded HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Topic delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Upper bound on a single write to a chosen subscriber, in milliseconds.
    pub publish_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use replica::config::BrokerConfig;
use replica::lifecycle::{self, Broker};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Broker configuration for tests: ephemeral local port, no metrics exporter.
pub fn test_config() -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config
}

/// Start a full broker on an ephemeral local port.
pub async fn start_broker() -> Broker {
    start_broker_with(test_config()).await
}

pub async fn start_broker_with(config: BrokerConfig) -> Broker {
    lifecycle::start(&config).await.unwrap()
}

/// Open a raw connection and send one line per topic.
pub async fn subscribe(addr: SocketAddr, topics: &[&str]) -> BufReader<TcpStream> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for topic in topics {
        stream.write_all(format!("{topic}\n").as_bytes()).await.unwrap();
    }
    BufReader::new(stream)
}

/// Read one delivered line, failing the test after a second.
pub async fn next_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(1), reader.read_line(&mut line))
        .await
        .expect("no message delivered")
        .unwrap();
    line
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// HTTP client that never goes through a proxy or reuses connections.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

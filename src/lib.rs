//! Protocol-sniffing pub/sub broker library.
//!
//! One TCP port serves two kinds of clients. HTTP clients publish with
//! `POST /publish`; every other connection is a subscriber that names one
//! topic per line and receives the messages routed to it.

pub mod broker;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use broker::TopicRegistry;
pub use config::BrokerConfig;
pub use http::HttpServer;
pub use lifecycle::{Broker, Shutdown};
pub use net::Demultiplexer;

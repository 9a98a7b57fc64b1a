//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP connection (from net::demux, sniffed bytes replayed)
//!     → server.rs (Axum setup, middleware)
//!     → handlers.rs (POST /publish, GET /status)
//!     → broker::TopicRegistry
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};

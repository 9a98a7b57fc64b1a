//! Topic-based delivery subsystem.
//!
//! # Data Flow
//! ```text
//! raw connection (from net::demux)
//!     → session.rs (read topic lines, subscribe, release on exit)
//!     → registry.rs (topic → subscribers)
//!
//! POST /publish (from http)
//!     → registry.rs (pick one subscriber at random, write message line)
//! ```
//!
//! # Design Decisions
//! - The registry is the only state shared by the HTTP and raw sides
//! - The registry is constructed once and passed around as `Arc<TopicRegistry>`
//! - Delivery is best-effort: at most one subscriber per publish, no retries

pub mod registry;
pub mod session;

pub use registry::{PublishOutcome, Subscriber, TopicRegistry};
pub use session::{run_session, serve};

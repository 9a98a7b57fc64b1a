//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → sniff.rs (single bounded read, HTTP or not)
//!     → peekable.rs (replay the sniffed bytes)
//!     → demux.rs (hand off to the HTTP side or the raw side)
//! ```
//!
//! # Design Decisions
//! - One socket serves both protocols; classification happens once per connection
//! - Connection slots are held until the connection is dropped, whichever side owns it
//! - A terminal listener error reaches both sides

pub mod connection;
pub mod demux;
pub mod listener;
pub mod peekable;
pub mod sniff;

pub use connection::{ConnectionId, SessionTracker};
pub use demux::{DemuxError, Demultiplexer, HttpIncoming, PendingConnection};
pub use listener::Listener;
pub use peekable::PeekableStream;
pub use sniff::Protocol;

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (connection id, tracking guard)
//!     → server.rs (read frames, demultiplex by stream number)
//!         → frame.rs (newline-delimited JSON decode)
//!         → one StreamSession task per stream
//!         → frame.rs (encode) → single writer task
//!
//! Stream States:
//!     first message → Active → end / abort / connection closed → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Malformed framing closes the connection; everything else is per stream

pub mod connection;
pub mod frame;
pub mod listener;
pub mod server;

pub use connection::{ConnectionId, ConnectionTracker, StreamKey};
pub use frame::{FrameError, FrameReader, InboundFrame, OutboundFrame};
pub use listener::{Listener, ListenerError};
pub use server::CalloutServer;

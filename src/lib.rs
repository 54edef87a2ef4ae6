//! Streaming request/response correlation and body buffering for
//! external-processing callout servers.

pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod transaction;

pub use config::schema::CalloutConfig;
pub use engine::{ProcessingEngine, StreamSession};
pub use lifecycle::Shutdown;
pub use net::CalloutServer;
pub use transaction::{TransactionId, TransactionStore};

//! Event processing subsystem.
//!
//! # Data Flow
//! ```text
//! transport stream events
//!     → session.rs (correlate on request headers, own the transaction)
//!     → processor.rs (apply event to TransactionState under the store lock)
//!     → mutation.rs (build header mutation from the frozen body, no lock held)
//!     → ProcessingResponse back to the transport
//!
//! On stream end / abort / worker drop:
//!     session.rs → ProcessingEngine::close → TransactionStore::delete
//! ```
//!
//! # Design Decisions
//! - One session per logical stream, events handled strictly in arrival order
//! - The engine never fails a stream; only store invariant violations do

pub mod mutation;
pub mod processor;
pub mod session;

pub use mutation::{BodyClassifier, MutationBuilder, MutationError, TRUNCATED_HEADER};
pub use processor::{EngineSettings, ProcessingEngine};
pub use session::{SessionError, StreamEvent, StreamSession};

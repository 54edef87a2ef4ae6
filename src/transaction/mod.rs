//! Transaction state subsystem.
//!
//! # Data Flow
//! ```text
//! First request-headers event on a stream
//!     → correlator.rs (stream identity → client header → random id)
//!     → store.rs (atomic create of TransactionState)
//!
//! Every later event
//!     → store.rs (lookup by id, refresh last-touched, mutate in place)
//!     → state.rs (phase transitions, completion and claim logic)
//!     → accumulator.rs (bounded, ordered body bytes)
//!
//! Background
//!     → sweeper.rs (periodic eviction of idle entries)
//! ```
//!
//! # Design Decisions
//! - The store is an explicit object handed to its users, never a global
//! - Sharded map: every access is a short exclusive section on one shard
//! - Deletion is idempotent; stream close and sweeper may race safely

pub mod accumulator;
pub mod correlator;
pub mod state;
pub mod store;
pub mod sweeper;

pub use accumulator::{BodyAccumulator, OverflowError};
pub use correlator::{CorrelationSource, Correlator};
pub use state::{AssembledBody, BodyUpdate, TransactionPhase, TransactionState};
pub use store::{StoreError, TransactionSnapshot, TransactionStore};
pub use sweeper::{ReclaimSweeper, SweeperHandle};

use serde::{Deserialize, Serialize};

/// Opaque identifier of one logical transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

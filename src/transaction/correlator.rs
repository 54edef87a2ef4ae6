//! Transaction id derivation.
//!
//! # Responsibilities
//! - Pick the id for a new transaction: transport stream identity, then a
//!   client-supplied correlation header, then a random id
//! - Atomically register the id so two live transactions never share one
//!
//! # Design Decisions
//! - The transport identity is an opaque string; the correlator knows
//!   nothing about connections or streams
//! - A client header that collides with a live transaction is not trusted;
//!   the transaction falls back to a generated id
//! - Random ids are 8 bytes of OS entropy, hex encoded, with a
//!   timestamp-plus-counter fallback if entropy is unavailable

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::HttpHeaders;
use crate::transaction::store::{StoreError, TransactionStore};
use crate::transaction::TransactionId;

/// Relaxed ordering is sufficient; only uniqueness matters.
static FALLBACK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Where a transaction id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationSource {
    StreamIdentity,
    ClientHeader,
    Generated,
}

impl CorrelationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationSource::StreamIdentity => "stream",
            CorrelationSource::ClientHeader => "header",
            CorrelationSource::Generated => "generated",
        }
    }
}

impl std::fmt::Display for CorrelationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Correlator {
    store: TransactionStore,
    prefer_stream_identity: bool,
    request_id_header: String,
}

impl Correlator {
    pub fn new(
        store: TransactionStore,
        prefer_stream_identity: bool,
        request_id_header: impl Into<String>,
    ) -> Self {
        Self {
            store,
            prefer_stream_identity,
            request_id_header: request_id_header.into(),
        }
    }

    /// Derive and register the id of a new transaction.
    ///
    /// An error means the store already holds a live transaction under an id
    /// that should have been unique (a transport identity or a fresh random
    /// id): an invariant violation, not a client mistake.
    pub fn open(
        &self,
        transport_identity: Option<&str>,
        headers: &HttpHeaders,
    ) -> Result<(TransactionId, CorrelationSource), StoreError> {
        if self.prefer_stream_identity {
            if let Some(identity) = transport_identity {
                let id = TransactionId::new(identity);
                self.store.create(id.clone())?;
                return Ok((id, CorrelationSource::StreamIdentity));
            }
        }

        if let Some(client_id) = headers
            .get(&self.request_id_header)
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            let id = TransactionId::new(client_id);
            match self.store.create(id.clone()) {
                Ok(()) => return Ok((id, CorrelationSource::ClientHeader)),
                Err(StoreError::DuplicateTransaction(_)) => {
                    tracing::warn!(
                        header = %self.request_id_header,
                        client_id = %client_id,
                        "Client correlation id already active, generating a new one"
                    );
                }
            }
        }

        let id = generate_transaction_id();
        self.store.create(id.clone())?;
        Ok((id, CorrelationSource::Generated))
    }
}

/// 8 random bytes, hex encoded.
pub fn generate_transaction_id() -> TransactionId {
    let mut bytes = [0u8; 8];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => TransactionId::new(hex::encode(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "Entropy unavailable, using timestamp id");
            fallback_transaction_id()
        }
    }
}

fn fallback_transaction_id() -> TransactionId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = FALLBACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    TransactionId::new(format!("ts-{:x}-{}", nanos, seq))
}

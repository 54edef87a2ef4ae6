//! Concurrent transaction table.
//!
//! # Responsibilities
//! - Atomic insert-or-fetch of per-transaction state
//! - In-place mutation under a short, per-shard exclusive lock
//! - Refresh last-touched on every access
//! - Idempotent delete and idle sweeps
//!
//! # Design Decisions
//! - `DashMap` shards the table; concurrent streams rarely contend
//! - Closures run under the shard lock and must stay cheap: no I/O and
//!   no body copies (snapshots are refcounted)
//! - Cloning the store clones a handle to the same table

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::transaction::state::{TransactionPhase, TransactionState};
use crate::transaction::TransactionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transaction {0} is already active")]
    DuplicateTransaction(TransactionId),
}

/// Read-only view of a transaction, detached from the store lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSnapshot {
    pub id: TransactionId,
    pub phase: TransactionPhase,
    pub body_len: usize,
    pub body_truncated: bool,
    pub has_trailers: bool,
    pub awaiting_completion: bool,
    pub response_headers_seen: bool,
    pub result_delivered: bool,
}

impl TransactionSnapshot {
    fn of(state: &TransactionState) -> Self {
        Self {
            id: state.id().clone(),
            phase: state.phase(),
            body_len: state.body().len(),
            body_truncated: state.body().is_truncated(),
            has_trailers: state.has_trailers(),
            awaiting_completion: state.is_awaiting_completion(),
            response_headers_seen: state.response_headers().is_some(),
            result_delivered: state.is_result_delivered(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionStore {
    inner: Arc<DashMap<TransactionId, TransactionState>>,
    max_body_bytes: usize,
}

impl TransactionStore {
    pub fn new(max_body_bytes: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_body_bytes,
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Insert a fresh transaction; fails if `id` is already live.
    pub fn create(&self, id: TransactionId) -> Result<(), StoreError> {
        match self.inner.entry(id) {
            Entry::Occupied(entry) => Err(StoreError::DuplicateTransaction(entry.key().clone())),
            Entry::Vacant(entry) => {
                let state = TransactionState::new(entry.key().clone(), self.max_body_bytes);
                entry.insert(state);
                metrics::set_active_transactions(self.inner.len());
                Ok(())
            }
        }
    }

    /// Return whether a fresh entry was inserted; an existing one is refreshed.
    pub fn get_or_create(&self, id: &TransactionId) -> bool {
        let mut created = false;
        self.inner
            .entry(id.clone())
            .and_modify(|state| state.touch())
            .or_insert_with(|| {
                created = true;
                TransactionState::new(id.clone(), self.max_body_bytes)
            });
        if created {
            metrics::set_active_transactions(self.inner.len());
        }
        created
    }

    /// Read-only lookup. Refreshes last-touched.
    pub fn get(&self, id: &TransactionId) -> Option<TransactionSnapshot> {
        self.inner.get_mut(id).map(|mut state| {
            state.touch();
            TransactionSnapshot::of(&state)
        })
    }

    /// Run `f` against the live state of `id`, refreshing last-touched first.
    pub fn update<R>(&self, id: &TransactionId, f: impl FnOnce(&mut TransactionState) -> R) -> Option<R> {
        self.inner.get_mut(id).map(|mut state| {
            state.touch();
            f(&mut state)
        })
    }

    /// Remove `id`. Returns the final state, or `None` if it was already gone.
    pub fn delete(&self, id: &TransactionId) -> Option<TransactionState> {
        let removed = self.inner.remove(id).map(|(_, mut state)| {
            state.close();
            state
        });
        if removed.is_some() {
            metrics::set_active_transactions(self.inner.len());
        }
        removed
    }

    /// Evict every entry idle for longer than `idle_deadline`.
    pub fn sweep(&self, idle_deadline: Duration) -> usize {
        match Instant::now().checked_sub(idle_deadline) {
            Some(cutoff) => self.sweep_before(cutoff),
            None => 0,
        }
    }

    /// Evict every entry last touched strictly before `cutoff`.
    pub fn sweep_before(&self, cutoff: Instant) -> usize {
        let before = self.inner.len();
        self.inner.retain(|id, state| {
            let keep = state.last_touched() >= cutoff;
            if !keep {
                tracing::debug!(
                    transaction_id = %id,
                    phase = %state.phase(),
                    body_len = state.body().len(),
                    "Evicting idle transaction"
                );
            }
            keep
        });
        let evicted = before.saturating_sub(self.inner.len());
        if evicted > 0 {
            metrics::record_evictions(evicted);
            metrics::set_active_transactions(self.inner.len());
        }
        evicted
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::state::BodyUpdate;

    fn id(s: &str) -> TransactionId {
        TransactionId::from(s)
    }

    #[test]
    fn create_rejects_live_duplicate() {
        let store = TransactionStore::new(1024);
        store.create(id("a")).unwrap();
        assert_eq!(
            store.create(id("a")),
            Err(StoreError::DuplicateTransaction(id("a")))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_create_returns_existing() {
        let store = TransactionStore::new(1024);
        assert!(store.get_or_create(&id("a")));
        store.update(&id("a"), |s| s.append_body(b"abc", false));
        assert!(!store.get_or_create(&id("a")));
        assert_eq!(store.get(&id("a")).unwrap().body_len, 3);
    }

    #[test]
    fn delete_twice_is_noop() {
        let store = TransactionStore::new(1024);
        store.create(id("a")).unwrap();
        let removed = store.delete(&id("a")).unwrap();
        assert_eq!(removed.phase(), TransactionPhase::Closed);
        assert!(store.delete(&id("a")).is_none());
        assert!(store.delete(&id("never")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn missing_lookups_return_none() {
        let store = TransactionStore::new(1024);
        assert!(store.get(&id("nope")).is_none());
        assert!(store.update(&id("nope"), |s| s.mark_trailers()).is_none());
    }

    #[test]
    fn overflowing_chunk_is_rejected_through_store() {
        let store = TransactionStore::new(4);
        store.create(id("a")).unwrap();
        assert_eq!(
            store.update(&id("a"), |s| s.append_body(b"abc", false)),
            Some(BodyUpdate::Appended)
        );
        let update = store.update(&id("a"), |s| s.append_body(b"de", false)).unwrap();
        assert!(matches!(update, BodyUpdate::Overflowed(_)));
        let snap = store.get(&id("a")).unwrap();
        assert_eq!(snap.body_len, 3);
        assert!(snap.body_truncated);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_idle_entries() {
        let store = TransactionStore::new(1024);
        store.create(id("stale")).unwrap();
        store.create(id("fresh")).unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&id("fresh")).is_some());

        assert_eq!(store.sweep(Duration::from_secs(1)), 1);
        assert!(!store.contains(&id("stale")));
        assert!(store.contains(&id("fresh")));
    }

    #[test]
    fn concurrent_creation_yields_one_entry() {
        let store = TransactionStore::new(1024);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.create(id("shared")).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }
}

//! Background eviction of idle transactions.
//!
//! # Responsibilities
//! - Periodically remove transactions idle past the deadline
//! - Stop and join deterministically on request
//!
//! # Design Decisions
//! - Backstop only: streams delete their own state on termination, the
//!   sweeper catches crashed workers and silently dropped connections
//! - Own cancellation channel, independent of server shutdown wiring

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::transaction::store::TransactionStore;

pub struct ReclaimSweeper {
    store: TransactionStore,
    idle_deadline: Duration,
    interval: Duration,
}

impl ReclaimSweeper {
    pub fn new(store: TransactionStore, idle_deadline: Duration, interval: Duration) -> Self {
        Self {
            store,
            idle_deadline,
            interval,
        }
    }

    /// Sweep every `idle_deadline / 2`.
    pub fn with_default_interval(store: TransactionStore, idle_deadline: Duration) -> Self {
        Self::new(store, idle_deadline, idle_deadline / 2)
    }

    /// Start sweeping on the current runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        SweeperHandle { stop_tx, join }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            idle_deadline_secs = self.idle_deadline.as_secs_f64(),
            interval_secs = self.interval.as_secs_f64(),
            "Reclaim sweeper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.store.sweep(self.idle_deadline);
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = self.store.len(), "Evicted idle transactions");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reclaim sweeper stopped");
    }
}

/// Handle to a running sweeper. Dropping it also stops the sweeper.
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Reclaim sweeper task failed");
        }
    }
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `callout_phase_events_total` (counter): inbound events by phase
//! - `callout_transactions_total` (counter): transactions opened by id source
//! - `callout_transactions_active` (gauge): live entries in the store
//! - `callout_active_streams` (gauge): streams with a running session
//! - `callout_body_overflow_total` (counter): chunks rejected by the body limit
//! - `callout_correlation_miss_total` (counter): events with no live transaction
//! - `callout_mutations_total` (counter): mutation outcomes
//! - `callout_evicted_total` (counter): transactions removed by the sweeper
//! - `callout_body_bytes` (histogram): assembled body size at mutation time

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::protocol::PhaseKind;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("callout_phase_events_total", "Inbound phase events by phase");
    describe_counter!("callout_transactions_total", "Transactions opened by id source");
    describe_gauge!("callout_transactions_active", "Live transactions in the store");
    describe_gauge!("callout_active_streams", "Streams with a running session");
    describe_counter!("callout_body_overflow_total", "Body chunks rejected by the size limit");
    describe_counter!("callout_correlation_miss_total", "Events with no live transaction");
    describe_counter!("callout_mutations_total", "Body-dependent mutation outcomes");
    describe_counter!("callout_evicted_total", "Transactions evicted while idle");
    describe_histogram!("callout_body_bytes", "Assembled body size at mutation time");
}

pub fn record_phase_event(kind: PhaseKind) {
    counter!("callout_phase_events_total", "phase" => kind.as_str()).increment(1);
}

pub fn record_transaction_opened(source: &'static str) {
    counter!("callout_transactions_total", "source" => source).increment(1);
}

pub fn set_active_transactions(count: usize) {
    gauge!("callout_transactions_active").set(count as f64);
}

pub fn stream_started() {
    gauge!("callout_active_streams").increment(1.0);
}

pub fn stream_finished() {
    gauge!("callout_active_streams").decrement(1.0);
}

pub fn record_body_overflow() {
    counter!("callout_body_overflow_total").increment(1);
}

pub fn record_correlation_miss(kind: PhaseKind) {
    counter!("callout_correlation_miss_total", "phase" => kind.as_str()).increment(1);
}

/// `outcome` is one of `computed`, `empty`, `skipped`, `rejected`, `failed`.
pub fn record_mutation(outcome: &'static str, body_len: usize) {
    counter!("callout_mutations_total", "outcome" => outcome).increment(1);
    histogram!("callout_body_bytes").record(body_len as f64);
}

pub fn record_evictions(count: usize) {
    counter!("callout_evicted_total").increment(count as u64);
}

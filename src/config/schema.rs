//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the callout
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reference body limit: 2 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Reference idle deadline: 5 minutes.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Root configuration for the callout server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CalloutConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Body buffering and eviction.
    pub buffering: BufferingConfig,

    /// Transaction id derivation.
    pub correlation: CorrelationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Maximum concurrent streams multiplexed on one connection.
    pub max_streams_per_connection: usize,

    /// Longest accepted frame line, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            max_streams_per_connection: 1_024,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

/// What to do with the body-dependent mutation when the body overflowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Skip the mutation; the transaction continues as passthrough.
    #[default]
    Skip,
    /// Run the mutation on the bytes that fit, flagged as truncated.
    Partial,
}

/// Body buffering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferingConfig {
    /// Maximum bytes buffered per transaction body.
    pub max_body_bytes: usize,

    /// Evict transactions untouched for this long.
    pub idle_timeout_secs: u64,

    /// Sweep period; half the idle timeout when unset.
    pub sweep_interval_secs: Option<u64>,

    /// Ask the transport for fully buffered bodies on the first response.
    pub buffered_delivery: bool,

    pub overflow_policy: OverflowPolicy,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: None,
            buffered_delivery: true,
            overflow_policy: OverflowPolicy::Skip,
        }
    }
}

impl BufferingConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.idle_timeout() / 2,
        }
    }
}

/// Correlation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Use the transport stream identity as the transaction id when available.
    pub prefer_stream_identity: bool,

    /// Client-supplied correlation header (lowercase).
    pub request_id_header: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            prefer_stream_identity: true,
            request_id_header: "x-request-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "callout_buffering=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for open connections after shutdown is triggered.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = CalloutConfig::default();
        assert_eq!(config.buffering.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.buffering.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.buffering.sweep_interval(), Duration::from_secs(150));
        assert!(config.buffering.buffered_delivery);
        assert_eq!(config.buffering.overflow_policy, OverflowPolicy::Skip);
        assert_eq!(config.correlation.request_id_header, "x-request-id");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: CalloutConfig = toml::from_str(
            r#"
            [buffering]
            max_body_bytes = 1024
            overflow_policy = "partial"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.buffering.max_body_bytes, 1024);
        assert_eq!(config.buffering.overflow_policy, OverflowPolicy::Partial);
        assert_eq!(config.buffering.idle_timeout_secs, 300);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, sweep interval within idle timeout)
//! - Validate addresses and header names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CalloutConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::CalloutConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("buffering.sweep_interval_secs ({interval}) exceeds idle_timeout_secs ({idle})")]
    SweepSlowerThanIdle { interval: u64, idle: u64 },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("correlation.request_id_header must be a non-empty lowercase header name: {0:?}")]
    InvalidHeaderName(String),
}

pub fn validate_config(config: &CalloutConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let nonzero = [
        ("listener.max_connections", config.listener.max_connections as u64),
        (
            "listener.max_streams_per_connection",
            config.listener.max_streams_per_connection as u64,
        ),
        ("listener.max_frame_bytes", config.listener.max_frame_bytes as u64),
        ("buffering.max_body_bytes", config.buffering.max_body_bytes as u64),
        ("buffering.idle_timeout_secs", config.buffering.idle_timeout_secs),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    match config.buffering.sweep_interval_secs {
        Some(0) => errors.push(ValidationError::Zero {
            field: "buffering.sweep_interval_secs",
        }),
        Some(interval) if interval > config.buffering.idle_timeout_secs => {
            errors.push(ValidationError::SweepSlowerThanIdle {
                interval,
                idle: config.buffering.idle_timeout_secs,
            })
        }
        _ => {}
    }

    let mut addresses = vec![("listener.bind_address", &config.listener.bind_address)];
    if config.observability.metrics_enabled {
        addresses.push(("observability.metrics_address", &config.observability.metrics_address));
    }
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            });
        }
    }

    let header = &config.correlation.request_id_header;
    let valid_header = !header.is_empty()
        && header
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid_header {
        errors.push(ValidationError::InvalidHeaderName(header.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&CalloutConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_violation() {
        let mut config = CalloutConfig::default();
        config.buffering.max_body_bytes = 0;
        config.buffering.sweep_interval_secs = Some(600);
        config.listener.bind_address = "not-an-address".into();
        config.correlation.request_id_header = "X-Request-Id".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero {
            field: "buffering.max_body_bytes"
        }));
        assert!(errors.contains(&ValidationError::SweepSlowerThanIdle {
            interval: 600,
            idle: 300
        }));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = CalloutConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn one_second_idle_uses_half_second_sweep() {
        let mut config = CalloutConfig::default();
        config.buffering.idle_timeout_secs = 1;
        assert!(validate_config(&config).is_ok());
        assert_eq!(
            config.buffering.sweep_interval(),
            std::time::Duration::from_millis(500)
        );

        config.buffering.sweep_interval_secs = Some(1);
        assert!(validate_config(&config).is_ok());
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CalloutConfig (validated, immutable)
//!     → cloned into the server, engine, and sweeper at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BufferingConfig, CalloutConfig, CorrelationConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, OverflowPolicy, ShutdownConfig,
};
pub use validation::{validate_config, ValidationError};

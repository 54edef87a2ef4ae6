//! Body-dependent mutation builders.
//!
//! # Responsibilities
//! - Turn an assembled body into header mutation instructions
//! - Provide the default body classifier
//!
//! # Design Decisions
//! - Builders are pure: no I/O, no access to transaction state
//! - Builders run outside the store lock on a private snapshot of the body
//! - Output header order is deterministic (sorted by key)

use std::collections::BTreeMap;
use thiserror::Error;

use crate::protocol::mutations::set_headers;
use crate::protocol::HeaderMutation;
use crate::transaction::AssembledBody;

/// Marks a mutation computed from a body that exceeded the buffer limit.
pub const TRUNCATED_HEADER: &str = "x-body-truncated";

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("body rejected by mutation builder: {0}")]
    Rejected(String),

    #[error("mutation builder failed: {0}")]
    Internal(String),
}

/// Trait for computing mutations from complete bodies.
pub trait MutationBuilder: Send + Sync + std::fmt::Debug {
    /// Build the header mutation for `body`.
    fn build(&self, body: &AssembledBody) -> Result<HeaderMutation, MutationError>;
}

/// Default builder: classifies the body and reports its size.
///
/// Emits `x-body-size`, `x-body-format` (`json`, `xml` or `text`) and, when the
/// lowercased body mentions them, `x-body-has-error` / `x-body-has-warning`.
#[derive(Debug, Clone, Default)]
pub struct BodyClassifier;

impl BodyClassifier {
    pub fn new() -> Self {
        Self
    }

    fn format_of(text: &str) -> &'static str {
        let trimmed = text.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            "json"
        } else if trimmed.starts_with('<') && trimmed.ends_with('>') {
            "xml"
        } else {
            "text"
        }
    }
}

impl MutationBuilder for BodyClassifier {
    fn build(&self, body: &AssembledBody) -> Result<HeaderMutation, MutationError> {
        let text = String::from_utf8_lossy(body.as_slice());
        let lowered = text.to_lowercase();

        let mut headers = BTreeMap::new();
        headers.insert("x-body-size", body.len().to_string());
        headers.insert("x-body-format", Self::format_of(&text).to_string());
        if lowered.contains("error") {
            headers.insert("x-body-has-error", "true".to_string());
        }
        if lowered.contains("warning") {
            headers.insert("x-body-has-warning", "true".to_string());
        }

        Ok(set_headers(headers))
    }
}

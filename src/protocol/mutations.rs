//! Helpers for building common responses.
//!
//! # Responsibilities
//! - Build no-op passthrough responses of any phase kind
//! - Build header mutations from plain key/value pairs
//! - Attach a mutation to the response of a given phase

use crate::protocol::message::{HeaderValue, PhaseKind};
use crate::protocol::response::{
    HeaderAppendAction, HeaderMutation, HeaderValueOption, PhaseResponse, ProcessingResponse,
};

/// A response that lets the phase continue unchanged.
pub fn passthrough(kind: PhaseKind) -> ProcessingResponse {
    ProcessingResponse {
        response: PhaseResponse::empty(kind),
        mode_override: None,
    }
}

/// A response of `kind` carrying `mutation`.
pub fn header_mutation_response(kind: PhaseKind, mutation: HeaderMutation) -> ProcessingResponse {
    let mut response = PhaseResponse::empty(kind);
    response.attach_header_mutation(mutation);
    ProcessingResponse {
        response,
        mode_override: None,
    }
}

/// A mutation that sets (overwriting) each `(key, value)` pair.
pub fn set_headers<I, K, V>(pairs: I) -> HeaderMutation
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    HeaderMutation {
        set_headers: pairs
            .into_iter()
            .map(|(k, v)| HeaderValueOption {
                header: HeaderValue::new(k, v),
                append_action: HeaderAppendAction::OverwriteIfExistsOrAdd,
            })
            .collect(),
        remove_headers: Vec::new(),
    }
}

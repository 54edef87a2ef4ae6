//! Outbound phase responses.

use serde::{Deserialize, Serialize};

use crate::protocol::message::{HeaderValue, PhaseKind};

/// How a set header combines with an existing header of the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderAppendAction {
    AppendIfExistsOrAdd,
    AddIfAbsent,
    #[default]
    OverwriteIfExistsOrAdd,
    OverwriteIfExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderValueOption {
    pub header: HeaderValue,
    #[serde(default)]
    pub append_action: HeaderAppendAction,
}

/// Header edits to apply to the message the response belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderMutation {
    pub set_headers: Vec<HeaderValueOption>,
    pub remove_headers: Vec<String>,
}

impl HeaderMutation {
    pub fn is_empty(&self) -> bool {
        self.set_headers.is_empty() && self.remove_headers.is_empty()
    }

    /// Value of a header this mutation sets, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.set_headers
            .iter()
            .find(|o| o.header.key.eq_ignore_ascii_case(key))
            .map(|o| o.header.value.as_str())
    }

    /// Fold `other` into `self`, keeping insertion order.
    pub fn merge(&mut self, other: HeaderMutation) {
        self.set_headers.extend(other.set_headers);
        self.remove_headers.extend(other.remove_headers);
    }
}

/// Response payload shared by header and body phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonResponse {
    pub header_mutation: Option<HeaderMutation>,
    pub clear_route_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailersResponse {
    pub header_mutation: Option<HeaderMutation>,
}

/// The phase-specific part of a response; always matches the inbound phase kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "payload", rename_all = "snake_case")]
pub enum PhaseResponse {
    RequestHeaders(CommonResponse),
    RequestBody(CommonResponse),
    RequestTrailers(TrailersResponse),
    ResponseHeaders(CommonResponse),
    ResponseBody(CommonResponse),
    ResponseTrailers(TrailersResponse),
}

impl PhaseResponse {
    /// An empty response of the given kind.
    pub fn empty(kind: PhaseKind) -> Self {
        match kind {
            PhaseKind::RequestHeaders => PhaseResponse::RequestHeaders(CommonResponse::default()),
            PhaseKind::RequestBody => PhaseResponse::RequestBody(CommonResponse::default()),
            PhaseKind::RequestTrailers => PhaseResponse::RequestTrailers(TrailersResponse::default()),
            PhaseKind::ResponseHeaders => PhaseResponse::ResponseHeaders(CommonResponse::default()),
            PhaseKind::ResponseBody => PhaseResponse::ResponseBody(CommonResponse::default()),
            PhaseKind::ResponseTrailers => {
                PhaseResponse::ResponseTrailers(TrailersResponse::default())
            }
        }
    }

    pub fn kind(&self) -> PhaseKind {
        match self {
            PhaseResponse::RequestHeaders(_) => PhaseKind::RequestHeaders,
            PhaseResponse::RequestBody(_) => PhaseKind::RequestBody,
            PhaseResponse::RequestTrailers(_) => PhaseKind::RequestTrailers,
            PhaseResponse::ResponseHeaders(_) => PhaseKind::ResponseHeaders,
            PhaseResponse::ResponseBody(_) => PhaseKind::ResponseBody,
            PhaseResponse::ResponseTrailers(_) => PhaseKind::ResponseTrailers,
        }
    }

    pub fn header_mutation(&self) -> Option<&HeaderMutation> {
        match self {
            PhaseResponse::RequestHeaders(c)
            | PhaseResponse::RequestBody(c)
            | PhaseResponse::ResponseHeaders(c)
            | PhaseResponse::ResponseBody(c) => c.header_mutation.as_ref(),
            PhaseResponse::RequestTrailers(t) | PhaseResponse::ResponseTrailers(t) => {
                t.header_mutation.as_ref()
            }
        }
    }

    fn header_mutation_slot(&mut self) -> &mut Option<HeaderMutation> {
        match self {
            PhaseResponse::RequestHeaders(c)
            | PhaseResponse::RequestBody(c)
            | PhaseResponse::ResponseHeaders(c)
            | PhaseResponse::ResponseBody(c) => &mut c.header_mutation,
            PhaseResponse::RequestTrailers(t) | PhaseResponse::ResponseTrailers(t) => {
                &mut t.header_mutation
            }
        }
    }

    /// Attach `mutation`, merging with one already present.
    pub fn attach_header_mutation(&mut self, mutation: HeaderMutation) {
        self.header_mutation_slot()
            .get_or_insert_with(HeaderMutation::default)
            .merge(mutation);
    }
}

/// Body delivery mode the transport should use for the rest of the exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySendMode {
    #[default]
    None,
    Streamed,
    Buffered,
    BufferedPartial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingMode {
    pub request_body_mode: BodySendMode,
    pub response_body_mode: BodySendMode,
}

impl ProcessingMode {
    /// Ask for both bodies as single, fully buffered units.
    pub fn buffered() -> Self {
        Self {
            request_body_mode: BodySendMode::Buffered,
            response_body_mode: BodySendMode::Buffered,
        }
    }
}

/// One outbound message: the phase response plus an optional mode override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResponse {
    pub response: PhaseResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_override: Option<ProcessingMode>,
}

impl ProcessingResponse {
    pub fn kind(&self) -> PhaseKind {
        self.response.kind()
    }

    pub fn header_mutation(&self) -> Option<&HeaderMutation> {
        self.response.header_mutation()
    }
}

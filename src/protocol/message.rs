//! Inbound phase events.
//!
//! # Responsibilities
//! - Model the six discrete events of one request/response exchange
//! - Provide case-insensitive header lookup for correlation

use serde::{Deserialize, Serialize};

/// A single header key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderValue {
    pub key: String,
    pub value: String,
}

impl HeaderValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Request or response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpHeaders {
    pub headers: Vec<HeaderValue>,

    /// True when no body follows these headers.
    pub end_of_stream: bool,
}

impl HttpHeaders {
    /// Build a header block from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: pairs
                .into_iter()
                .map(|(k, v)| HeaderValue::new(k, v))
                .collect(),
            end_of_stream: false,
        }
    }

    /// Look up the first header matching `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// One body chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBody {
    pub body: Vec<u8>,
    pub end_of_stream: bool,
}

impl HttpBody {
    pub fn chunk(body: impl Into<Vec<u8>>, end_of_stream: bool) -> Self {
        Self {
            body: body.into(),
            end_of_stream,
        }
    }
}

/// Request or response trailers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTrailers {
    pub trailers: Vec<HeaderValue>,
}

/// One discrete event of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "payload", rename_all = "snake_case")]
pub enum PhaseMessage {
    RequestHeaders(HttpHeaders),
    RequestBody(HttpBody),
    RequestTrailers(HttpTrailers),
    ResponseHeaders(HttpHeaders),
    ResponseBody(HttpBody),
    ResponseTrailers(HttpTrailers),
}

impl PhaseMessage {
    pub fn kind(&self) -> PhaseKind {
        match self {
            PhaseMessage::RequestHeaders(_) => PhaseKind::RequestHeaders,
            PhaseMessage::RequestBody(_) => PhaseKind::RequestBody,
            PhaseMessage::RequestTrailers(_) => PhaseKind::RequestTrailers,
            PhaseMessage::ResponseHeaders(_) => PhaseKind::ResponseHeaders,
            PhaseMessage::ResponseBody(_) => PhaseKind::ResponseBody,
            PhaseMessage::ResponseTrailers(_) => PhaseKind::ResponseTrailers,
        }
    }
}

/// Discriminant of a [`PhaseMessage`], used for responses, logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    RequestHeaders,
    RequestBody,
    RequestTrailers,
    ResponseHeaders,
    ResponseBody,
    ResponseTrailers,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::RequestHeaders => "request_headers",
            PhaseKind::RequestBody => "request_body",
            PhaseKind::RequestTrailers => "request_trailers",
            PhaseKind::ResponseHeaders => "response_headers",
            PhaseKind::ResponseBody => "response_body",
            PhaseKind::ResponseTrailers => "response_trailers",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Per-transaction state machine.
//!
//! # State Machine
//! ```text
//! Started ──body chunk──▶ AccumulatingBody ──eos chunk / trailers──▶ BodyComplete
//!    │                                                                  │
//!    └──headers with end_of_stream─────────────────────────────────────┘
//!                                                                       │
//!                             response headers seen and body complete   ▼
//!                                                              MutationComputed
//!
//! any state ──stream terminated / evicted──▶ Closed
//! ```
//!
//! Completion ("body frozen") is signalled by whichever of the end-of-stream
//! chunk or the request trailers arrives first. The mutation is claimed once,
//! by whichever of {body completion, trailers, response headers} arrives last.

use std::sync::Arc;
use tokio::time::Instant;

use crate::protocol::HttpHeaders;
use crate::transaction::accumulator::{BodyAccumulator, OverflowError};
use crate::transaction::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Started,
    AccumulatingBody,
    BodyComplete,
    MutationComputed,
    Closed,
}

impl TransactionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionPhase::Started => "started",
            TransactionPhase::AccumulatingBody => "accumulating_body",
            TransactionPhase::BodyComplete => "body_complete",
            TransactionPhase::MutationComputed => "mutation_computed",
            TransactionPhase::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Private copy of the assembled body, handed to the mutation builder.
#[derive(Debug, Clone)]
pub struct AssembledBody {
    pub bytes: Arc<Vec<u8>>,
    /// Some chunks were dropped because the body exceeded its limit.
    pub truncated: bool,
}

impl AssembledBody {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of feeding one body chunk to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyUpdate {
    Appended,
    Overflowed(OverflowError),
    /// The body was already frozen; the chunk was not buffered.
    AfterCompletion,
}

/// State of one logical request/response exchange.
#[derive(Debug)]
pub struct TransactionState {
    id: TransactionId,
    body: BodyAccumulator,
    response_headers: Option<HttpHeaders>,
    has_trailers: bool,
    awaiting_completion: bool,
    result_delivered: bool,
    last_touched: Instant,
    phase: TransactionPhase,
}

impl TransactionState {
    pub fn new(id: TransactionId, max_body_bytes: usize) -> Self {
        Self {
            id,
            body: BodyAccumulator::new(max_body_bytes),
            response_headers: None,
            has_trailers: false,
            awaiting_completion: true,
            result_delivered: false,
            last_touched: Instant::now(),
            phase: TransactionPhase::Started,
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    pub fn body(&self) -> &BodyAccumulator {
        &self.body
    }

    pub fn response_headers(&self) -> Option<&HttpHeaders> {
        self.response_headers.as_ref()
    }

    pub fn has_trailers(&self) -> bool {
        self.has_trailers
    }

    pub fn is_awaiting_completion(&self) -> bool {
        self.awaiting_completion
    }

    pub fn is_result_delivered(&self) -> bool {
        self.result_delivered
    }

    pub fn last_touched(&self) -> Instant {
        self.last_touched
    }

    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    /// Request headers that close the stream mean there is no body to wait for.
    pub fn on_request_headers(&mut self, end_of_stream: bool) {
        if end_of_stream {
            self.freeze_body();
        }
    }

    pub fn append_body(&mut self, chunk: &[u8], end_of_stream: bool) -> BodyUpdate {
        if !self.awaiting_completion {
            return BodyUpdate::AfterCompletion;
        }
        self.phase = TransactionPhase::AccumulatingBody;
        let update = match self.body.append(chunk) {
            Ok(()) => BodyUpdate::Appended,
            Err(overflow) => BodyUpdate::Overflowed(overflow),
        };
        if end_of_stream {
            self.freeze_body();
        }
        update
    }

    /// Trailers after a non-terminated body also complete it.
    pub fn mark_trailers(&mut self) {
        self.has_trailers = true;
        self.freeze_body();
    }

    pub fn record_response_headers(&mut self, headers: HttpHeaders) {
        self.response_headers = Some(headers);
    }

    pub fn ready_for_mutation(&self) -> bool {
        !self.awaiting_completion && self.response_headers.is_some() && !self.result_delivered
    }

    /// Claim the single mutation computation for this transaction.
    ///
    /// Returns the assembled body the first time the transaction is ready and
    /// `None` on every other call.
    pub fn claim_mutation(&mut self) -> Option<AssembledBody> {
        if !self.ready_for_mutation() {
            return None;
        }
        self.result_delivered = true;
        self.phase = TransactionPhase::MutationComputed;
        Some(AssembledBody {
            bytes: self.body.snapshot(),
            truncated: self.body.is_truncated(),
        })
    }

    pub fn close(&mut self) {
        self.phase = TransactionPhase::Closed;
    }

    fn freeze_body(&mut self) {
        if self.awaiting_completion {
            self.awaiting_completion = false;
            self.body.mark_end_of_stream();
            self.phase = TransactionPhase::BodyComplete;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TransactionState {
        TransactionState::new(TransactionId::from("t-1"), 16)
    }

    #[test]
    fn eos_chunk_completes_body() {
        let mut s = state();
        assert_eq!(s.append_body(b"abc", false), BodyUpdate::Appended);
        assert_eq!(s.phase(), TransactionPhase::AccumulatingBody);
        assert_eq!(s.append_body(b"def", true), BodyUpdate::Appended);
        assert_eq!(s.phase(), TransactionPhase::BodyComplete);
        assert!(!s.is_awaiting_completion());
        assert_eq!(s.body().snapshot().as_slice(), b"abcdef");
    }

    #[test]
    fn chunk_after_completion_is_not_buffered() {
        let mut s = state();
        s.append_body(b"abc", true);
        assert_eq!(s.append_body(b"zzz", false), BodyUpdate::AfterCompletion);
        assert_eq!(s.body().snapshot().as_slice(), b"abc");
    }

    #[test]
    fn trailers_complete_unterminated_body() {
        let mut s = state();
        s.append_body(b"abc", false);
        s.mark_trailers();
        assert!(s.has_trailers());
        assert_eq!(s.phase(), TransactionPhase::BodyComplete);
        assert!(s.body().is_end_of_stream());
    }

    #[test]
    fn headers_with_eos_complete_empty_body() {
        let mut s = state();
        s.on_request_headers(true);
        assert!(!s.is_awaiting_completion());
        assert!(s.body().is_empty());
    }

    #[test]
    fn mutation_claimed_exactly_once() {
        let mut s = state();
        s.append_body(b"abc", true);
        assert!(s.claim_mutation().is_none(), "needs response headers");

        s.record_response_headers(HttpHeaders::default());
        let body = s.claim_mutation().expect("first claim");
        assert_eq!(body.as_slice(), b"abc");
        assert!(!body.truncated);
        assert!(s.is_result_delivered());
        assert_eq!(s.phase(), TransactionPhase::MutationComputed);

        s.mark_trailers();
        s.record_response_headers(HttpHeaders::default());
        assert!(s.claim_mutation().is_none());
    }

    #[test]
    fn overflow_marks_claim_truncated() {
        let mut s = state();
        assert!(matches!(
            s.append_body(&[0u8; 20], true),
            BodyUpdate::Overflowed(_)
        ));
        assert_eq!(s.phase(), TransactionPhase::BodyComplete);
        s.record_response_headers(HttpHeaders::default());
        let body = s.claim_mutation().unwrap();
        assert!(body.truncated);
        assert!(body.is_empty());
    }
}

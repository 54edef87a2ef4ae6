//! Per-event dispatcher.
//!
//! # Responsibilities
//! - Apply one inbound phase event to its transaction's state
//! - Decide when the body-dependent mutation runs and which response carries it
//! - Produce exactly one outbound response per inbound event
//!
//! # Design Decisions
//! - Every store access is one short critical section via `TransactionStore::update`;
//!   the mutation builder runs after the lock is released
//! - The mutation rides on the response of whichever event completes the
//!   readiness condition (body frozen and response headers seen)
//! - Missing state yields a passthrough response, never an error
//! - Response body and response trailers are passed through untouched

use std::sync::Arc;

use crate::config::{BufferingConfig, OverflowPolicy};
use crate::engine::mutation::{BodyClassifier, MutationBuilder, MutationError, TRUNCATED_HEADER};
use crate::observability::metrics;
use crate::protocol::mutations::{header_mutation_response, passthrough, set_headers};
use crate::protocol::{PhaseKind, PhaseMessage, ProcessingMode, ProcessingResponse};
use crate::transaction::{AssembledBody, BodyUpdate, TransactionId, TransactionStore};

/// Engine behaviour knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Attach the buffered-delivery override to request-headers responses.
    pub buffered_delivery: bool,
    pub overflow_policy: OverflowPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            buffered_delivery: true,
            overflow_policy: OverflowPolicy::Skip,
        }
    }
}

impl From<&BufferingConfig> for EngineSettings {
    fn from(config: &BufferingConfig) -> Self {
        Self {
            buffered_delivery: config.buffered_delivery,
            overflow_policy: config.overflow_policy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingEngine {
    store: TransactionStore,
    builder: Arc<dyn MutationBuilder>,
    settings: EngineSettings,
}

impl ProcessingEngine {
    pub fn new(
        store: TransactionStore,
        builder: Arc<dyn MutationBuilder>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            builder,
            settings,
        }
    }

    /// Engine with the default [`BodyClassifier`].
    pub fn with_classifier(store: TransactionStore, settings: EngineSettings) -> Self {
        Self::new(store, Arc::new(BodyClassifier::new()), settings)
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    /// Handle one inbound event for transaction `id`.
    ///
    /// `None` means the caller has no transaction for this event (for example a
    /// body chunk that arrived before any request headers); the event is
    /// answered with a passthrough.
    pub fn process(&self, id: Option<&TransactionId>, message: PhaseMessage) -> ProcessingResponse {
        let kind = message.kind();
        metrics::record_phase_event(kind);

        let Some(id) = id else {
            return self.correlation_miss(None, kind);
        };

        match message {
            PhaseMessage::RequestHeaders(headers) => {
                let claimed = self.store.update(id, |state| {
                    state.on_request_headers(headers.end_of_stream);
                    state.claim_mutation()
                });
                let mut response = match claimed {
                    Some(claimed) => self.respond(id, kind, claimed),
                    None => self.correlation_miss(Some(id), kind),
                };
                if self.settings.buffered_delivery {
                    response.mode_override = Some(ProcessingMode::buffered());
                }
                response
            }
            PhaseMessage::RequestBody(chunk) => {
                let outcome = self.store.update(id, |state| {
                    let update = state.append_body(&chunk.body, chunk.end_of_stream);
                    (update, state.claim_mutation())
                });
                match outcome {
                    Some((update, claimed)) => {
                        self.log_body_update(id, &update, chunk.body.len());
                        self.respond(id, kind, claimed)
                    }
                    None => self.correlation_miss(Some(id), kind),
                }
            }
            PhaseMessage::RequestTrailers(_) => {
                let claimed = self.store.update(id, |state| {
                    state.mark_trailers();
                    state.claim_mutation()
                });
                match claimed {
                    Some(claimed) => self.respond(id, kind, claimed),
                    None => self.correlation_miss(Some(id), kind),
                }
            }
            PhaseMessage::ResponseHeaders(headers) => {
                let claimed = self.store.update(id, |state| {
                    state.record_response_headers(headers);
                    state.claim_mutation()
                });
                match claimed {
                    Some(claimed) => {
                        if claimed.is_none() {
                            tracing::debug!(
                                transaction_id = %id,
                                "Response headers seen before body completion, deferring mutation"
                            );
                        }
                        self.respond(id, kind, claimed)
                    }
                    None => self.correlation_miss(Some(id), kind),
                }
            }
            PhaseMessage::ResponseBody(_) | PhaseMessage::ResponseTrailers(_) => {
                match self.store.update(id, |_| ()) {
                    Some(()) => passthrough(kind),
                    None => self.correlation_miss(Some(id), kind),
                }
            }
        }
    }

    /// Delete the transaction. Safe to call more than once.
    pub fn close(&self, id: &TransactionId) -> bool {
        match self.store.delete(id) {
            Some(state) => {
                tracing::debug!(
                    transaction_id = %id,
                    phase = %state.phase(),
                    body_len = state.body().len(),
                    "Transaction closed"
                );
                true
            }
            None => false,
        }
    }

    fn respond(
        &self,
        id: &TransactionId,
        kind: PhaseKind,
        claimed: Option<AssembledBody>,
    ) -> ProcessingResponse {
        match claimed {
            Some(body) => self.compute_mutation(id, kind, body),
            None => passthrough(kind),
        }
    }

    fn compute_mutation(
        &self,
        id: &TransactionId,
        kind: PhaseKind,
        body: AssembledBody,
    ) -> ProcessingResponse {
        if body.truncated && self.settings.overflow_policy == OverflowPolicy::Skip {
            tracing::info!(
                transaction_id = %id,
                body_len = body.len(),
                "Body exceeded buffer limit, skipping mutation"
            );
            metrics::record_mutation("skipped", body.len());
            return passthrough(kind);
        }

        match self.builder.build(&body) {
            Ok(mut mutation) => {
                if body.truncated {
                    mutation.merge(set_headers([(TRUNCATED_HEADER, "true")]));
                }
                if mutation.is_empty() {
                    metrics::record_mutation("empty", body.len());
                    return passthrough(kind);
                }
                tracing::debug!(
                    transaction_id = %id,
                    phase = %kind,
                    body_len = body.len(),
                    truncated = body.truncated,
                    headers = mutation.set_headers.len(),
                    "Computed body mutation"
                );
                metrics::record_mutation("computed", body.len());
                header_mutation_response(kind, mutation)
            }
            Err(MutationError::Rejected(reason)) => {
                tracing::debug!(
                    transaction_id = %id,
                    reason = %reason,
                    body_len = body.len(),
                    "Mutation builder declined body"
                );
                metrics::record_mutation("rejected", body.len());
                passthrough(kind)
            }
            Err(e) => {
                tracing::warn!(
                    transaction_id = %id,
                    error = %e,
                    body_len = body.len(),
                    "Mutation builder failed, passing through"
                );
                metrics::record_mutation("failed", body.len());
                passthrough(kind)
            }
        }
    }

    fn log_body_update(&self, id: &TransactionId, update: &BodyUpdate, chunk_len: usize) {
        match update {
            BodyUpdate::Appended => {
                tracing::trace!(transaction_id = %id, chunk_len, "Buffered body chunk");
            }
            BodyUpdate::Overflowed(overflow) => {
                tracing::warn!(
                    transaction_id = %id,
                    buffered = overflow.buffered,
                    attempted = overflow.attempted,
                    limit = overflow.limit,
                    "Body chunk dropped from buffering"
                );
                metrics::record_body_overflow();
            }
            BodyUpdate::AfterCompletion => {
                tracing::debug!(
                    transaction_id = %id,
                    chunk_len,
                    "Body chunk after completion ignored"
                );
            }
        }
    }

    fn correlation_miss(&self, id: Option<&TransactionId>, kind: PhaseKind) -> ProcessingResponse {
        match id {
            Some(id) => tracing::warn!(
                transaction_id = %id,
                phase = %kind,
                "No live transaction, passing through"
            ),
            None => tracing::warn!(phase = %kind, "Event before request headers, passing through"),
        }
        metrics::record_correlation_miss(kind);
        passthrough(kind)
    }
}

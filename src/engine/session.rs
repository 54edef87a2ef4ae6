//! Per-stream worker.
//!
//! # Responsibilities
//! - Open the stream's transaction on request headers via the correlator
//! - Feed every event to the engine in arrival order, one response per event
//! - Delete the transaction when the stream ends, aborts, or the worker is dropped
//!
//! # Design Decisions
//! - Transport-agnostic: input is any `Stream` of [`StreamEvent`], output an mpsc sender
//! - A store invariant violation fails this stream only

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::engine::processor::ProcessingEngine;
use crate::observability::metrics;
use crate::protocol::{PhaseMessage, ProcessingResponse};
use crate::transaction::{Correlator, StoreError, TransactionId};

/// One item from the transport for a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message(PhaseMessage),
    /// Clean end of stream.
    End,
    /// The transport gave up on the stream.
    Abort(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transaction store invariant violated: {0}")]
    StoreCorruption(#[from] StoreError),

    #[error("outbound channel closed")]
    OutboundClosed,
}

pub struct StreamSession {
    engine: ProcessingEngine,
    correlator: Correlator,
    transport_identity: Option<String>,
    transaction: Option<TransactionId>,
}

impl StreamSession {
    pub fn new(
        engine: ProcessingEngine,
        correlator: Correlator,
        transport_identity: Option<String>,
    ) -> Self {
        Self {
            engine,
            correlator,
            transport_identity,
            transaction: None,
        }
    }

    /// Id of the transaction currently owned by this stream.
    pub fn transaction(&self) -> Option<&TransactionId> {
        self.transaction.as_ref()
    }

    /// Process one event and return its response.
    pub fn handle(&mut self, message: PhaseMessage) -> Result<ProcessingResponse, SessionError> {
        if let PhaseMessage::RequestHeaders(headers) = &message {
            if let Some(previous) = self.transaction.take() {
                tracing::warn!(
                    transaction_id = %previous,
                    "Request headers repeated on stream, starting a new transaction"
                );
                self.engine.close(&previous);
            }

            let (id, source) = self
                .correlator
                .open(self.transport_identity.as_deref(), headers)
                .inspect_err(|e| {
                    tracing::error!(
                        error = %e,
                        stream = self.transport_identity.as_deref().unwrap_or("-"),
                        "Transaction store invariant violated"
                    );
                })?;
            tracing::debug!(transaction_id = %id, source = %source, "Transaction opened");
            metrics::record_transaction_opened(source.as_str());
            self.transaction = Some(id);
        }

        Ok(self.engine.process(self.transaction.as_ref(), message))
    }

    /// Drive the session until the stream ends.
    ///
    /// The transaction is deleted on every exit path.
    pub async fn run<S>(
        mut self,
        mut inbound: S,
        outbound: mpsc::Sender<ProcessingResponse>,
    ) -> Result<(), SessionError>
    where
        S: Stream<Item = StreamEvent> + Unpin,
    {
        metrics::stream_started();

        let result = loop {
            match inbound.next().await {
                Some(StreamEvent::Message(message)) => {
                    let response = match self.handle(message) {
                        Ok(response) => response,
                        Err(e) => break Err(e),
                    };
                    if outbound.send(response).await.is_err() {
                        break Err(SessionError::OutboundClosed);
                    }
                }
                Some(StreamEvent::End) | None => break Ok(()),
                Some(StreamEvent::Abort(reason)) => {
                    tracing::debug!(
                        stream = self.transport_identity.as_deref().unwrap_or("-"),
                        reason = %reason,
                        "Stream aborted"
                    );
                    break Ok(());
                }
            }
        };

        self.finish();
        metrics::stream_finished();
        result
    }

    fn finish(&mut self) {
        if let Some(id) = self.transaction.take() {
            self.engine.close(&id);
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.finish();
    }
}

//! Callout server: accept loop and per-connection stream demultiplexing.
//!
//! # Responsibilities
//! - Accept connections through the bounded listener
//! - Split each connection into logical streams and run one session per stream
//! - Own the reclaim sweeper for the lifetime of the server
//! - Drain connections on shutdown, bounded by the drain timeout
//!
//! # Design Decisions
//! - One task per connection, one task per stream; a stream task never blocks
//!   its siblings
//! - A single writer task per connection serializes outbound frames
//! - Stream identity `conn-N/S.G` is the transport identity given to the correlator
//! - After shutdown is signalled, open streams keep running but new stream
//!   numbers are refused

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::CalloutConfig;
use crate::engine::{
    BodyClassifier, EngineSettings, MutationBuilder, ProcessingEngine, StreamEvent, StreamSession,
};
use crate::net::connection::{ConnectionGuard, ConnectionId, ConnectionTracker, StreamKey};
use crate::net::frame::{write_frame, FrameReader, InboundFrame, OutboundFrame};
use crate::net::listener::{Listener, ListenerError};
use crate::protocol::ProcessingResponse;
use crate::transaction::{Correlator, ReclaimSweeper, TransactionStore};

const STREAM_CHANNEL_CAPACITY: usize = 64;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Callout server over newline-delimited JSON.
pub struct CalloutServer {
    config: CalloutConfig,
    /// Transaction table shared by every stream and the sweeper.
    store: TransactionStore,
    engine: ProcessingEngine,
    correlator: Correlator,
    /// Active connections, for draining on shutdown.
    tracker: ConnectionTracker,
}

impl CalloutServer {
    /// Create a server using the default body classifier.
    pub fn new(config: CalloutConfig) -> Self {
        Self::with_builder(config, Arc::new(BodyClassifier::new()))
    }

    pub fn with_builder(config: CalloutConfig, builder: Arc<dyn MutationBuilder>) -> Self {
        let store = TransactionStore::new(config.buffering.max_body_bytes);
        let engine = ProcessingEngine::new(
            store.clone(),
            builder,
            EngineSettings::from(&config.buffering),
        );
        let correlator = Correlator::new(
            store.clone(),
            config.correlation.prefer_stream_identity,
            config.correlation.request_id_header.clone(),
        );
        Self {
            config,
            store,
            engine,
            correlator,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Shared transaction store, for inspection.
    pub fn store(&self) -> TransactionStore {
        self.store.clone()
    }

    /// Connection tracker, for inspection.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run until `shutdown` fires, then drain and stop the sweeper.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Callout server starting");
        }

        let sweeper = ReclaimSweeper::new(
            self.store.clone(),
            self.config.buffering.idle_timeout(),
            self.config.buffering.sweep_interval(),
        )
        .spawn();

        let mut connections = JoinSet::new();
        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let handler = ConnectionHandler {
                            engine: self.engine.clone(),
                            correlator: self.correlator.clone(),
                            max_streams: self.config.listener.max_streams_per_connection,
                            max_frame_bytes: self.config.listener.max_frame_bytes,
                        };
                        let guard = self.tracker.track();
                        let conn_shutdown = shutdown.resubscribe();
                        connections.spawn(async move {
                            let _permit = permit;
                            handler.run(stream, peer, guard, conn_shutdown).await;
                        });
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => break Err(e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
            }
        };

        drop(listener);

        let drain = Duration::from_secs(self.config.shutdown.drain_timeout_secs);
        tracing::info!(
            active_connections = self.tracker.active_count(),
            drain_timeout_secs = drain.as_secs(),
            "Draining connections"
        );
        if tokio::time::timeout(drain, self.tracker.wait_for_drain())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed, closing remaining connections"
            );
        }
        connections.shutdown().await;

        sweeper.stop().await;
        tracing::info!(live_transactions = self.store.len(), "Callout server stopped");
        result
    }
}

/// Per-connection state borrowed by `dispatch`.
struct DispatchContext<'a> {
    connection: ConnectionId,
    /// Refuse frames for stream numbers not already open.
    draining: bool,
    /// Open streams by client-chosen number.
    streams: &'a mut HashMap<u64, mpsc::Sender<StreamEvent>>,
    tasks: &'a mut JoinSet<()>,
    /// Streams opened so far; the next stream's generation.
    opened: &'a mut u64,
    out_tx: &'a mpsc::Sender<OutboundFrame>,
}

struct ConnectionHandler {
    engine: ProcessingEngine,
    correlator: Correlator,
    max_streams: usize,
    max_frame_bytes: usize,
}

impl ConnectionHandler {
    async fn run(
        self,
        stream: TcpStream,
        peer: SocketAddr,
        guard: ConnectionGuard,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let connection = guard.id();
        tracing::debug!(connection_id = %connection, peer_addr = %peer, "Connection opened");

        let (read_half, mut write_half) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CHANNEL_CAPACITY);
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &frame).await {
                    tracing::debug!(connection_id = %connection, error = %e, "Write failed");
                    break;
                }
            }
        });

        let mut reader = FrameReader::new(read_half, self.max_frame_bytes);
        let mut streams: HashMap<u64, mpsc::Sender<StreamEvent>> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut opened = 0u64;
        let mut draining = false;

        loop {
            tokio::select! {
                frame = reader.next::<InboundFrame>() => match frame {
                    Ok(Some(frame)) => {
                        let ctx = DispatchContext {
                            connection,
                            draining,
                            streams: &mut streams,
                            tasks: &mut tasks,
                            opened: &mut opened,
                            out_tx: &out_tx,
                        };
                        self.dispatch(frame, ctx).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(connection_id = %connection, error = %e, "Closing connection on framing error");
                        let _ = out_tx
                            .send(OutboundFrame::Error { stream: 0, message: e.to_string() })
                            .await;
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(connection_id = %connection, error = %e, "Stream task failed");
                    }
                    streams.retain(|_, tx| !tx.is_closed());
                }
                _ = shutdown.recv(), if !draining => {
                    draining = true;
                }
            }
        }

        for (_, tx) in streams.drain() {
            let _ = tx.try_send(StreamEvent::Abort("connection closed".into()));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(connection_id = %connection, error = %e, "Stream task failed");
            }
        }
        drop(out_tx);
        let _ = writer.await;

        tracing::debug!(connection_id = %connection, "Connection finished");
        drop(guard);
    }

    async fn dispatch(&self, frame: InboundFrame, ctx: DispatchContext<'_>) {
        let DispatchContext {
            connection,
            draining,
            streams,
            tasks,
            opened,
            out_tx,
        } = ctx;

        let (number, event) = match frame {
            InboundFrame::Message { stream, message } => (stream, StreamEvent::Message(message)),
            InboundFrame::End { stream } => {
                if let Some(tx) = streams.remove(&stream) {
                    let _ = tx.send(StreamEvent::End).await;
                }
                return;
            }
            InboundFrame::Abort { stream, reason } => {
                if let Some(tx) = streams.remove(&stream) {
                    let _ = tx.send(StreamEvent::Abort(reason)).await;
                }
                return;
            }
        };

        let tx = match streams.get(&number) {
            Some(tx) => tx.clone(),
            None => {
                let refusal = if draining {
                    Some("server is shutting down")
                } else if streams.len() >= self.max_streams {
                    Some("too many concurrent streams")
                } else {
                    None
                };
                if let Some(reason) = refusal {
                    tracing::debug!(connection_id = %connection, stream = number, reason, "Stream refused");
                    let _ = out_tx
                        .send(OutboundFrame::Error { stream: number, message: reason.to_string() })
                        .await;
                    return;
                }
                let key = StreamKey::new(connection, number, *opened);
                *opened += 1;
                let tx = self.open_stream(key, tasks, out_tx.clone());
                streams.insert(number, tx.clone());
                tx
            }
        };

        if tx.send(event).await.is_err() {
            streams.remove(&number);
            let _ = out_tx
                .send(OutboundFrame::Error { stream: number, message: "stream closed".to_string() })
                .await;
        }
    }

    fn open_stream(
        &self,
        key: StreamKey,
        tasks: &mut JoinSet<()>,
        out_tx: mpsc::Sender<OutboundFrame>,
    ) -> mpsc::Sender<StreamEvent> {
        let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        let events = ReceiverStream::new(event_rx);

        let session = StreamSession::new(
            self.engine.clone(),
            self.correlator.clone(),
            Some(key.to_string()),
        );

        tasks.spawn(async move {
            let number = key.stream;
            let (response_tx, mut response_rx) =
                mpsc::channel::<ProcessingResponse>(STREAM_CHANNEL_CAPACITY);

            let forward_tx = out_tx.clone();
            let forward = async move {
                while let Some(response) = response_rx.recv().await {
                    let frame = OutboundFrame::Response { stream: number, response };
                    if forward_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            };
            let (result, ()) = tokio::join!(session.run(events, response_tx), forward);

            if let Err(e) = result {
                tracing::warn!(stream = %key, error = %e, "Stream failed");
                let _ = out_tx
                    .send(OutboundFrame::Error { stream: number, message: e.to_string() })
                    .await;
            }
        });

        event_tx
    }
}

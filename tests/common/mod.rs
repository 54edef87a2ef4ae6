//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use callout_buffering::config::CalloutConfig;
use callout_buffering::net::frame::{write_frame, FrameReader, InboundFrame, OutboundFrame};
use callout_buffering::net::{CalloutServer, ConnectionTracker, Listener, ListenerError};
use callout_buffering::protocol::{
    HttpBody, HttpHeaders, HttpTrailers, PhaseMessage, ProcessingResponse,
};
use callout_buffering::{Shutdown, TransactionStore};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: TransactionStore,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

impl TestServer {
    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(30), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Config bound to an ephemeral loopback port.
pub fn test_config() -> CalloutConfig {
    let mut config = CalloutConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.shutdown.drain_timeout_secs = 1;
    config
}

pub async fn start_server(config: CalloutConfig) -> TestServer {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = CalloutServer::new(config);
    let store = server.store();
    let tracker = server.tracker();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    TestServer {
        addr,
        store,
        tracker,
        shutdown,
        handle,
    }
}

/// Poll until `store` is empty.
pub async fn wait_until_empty(store: &TransactionStore) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        while !store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("transactions were not cleaned up");
}

/// Framed client for one connection.
pub struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: FrameReader::new(read_half, 16 * 1024 * 1024),
            writer,
        }
    }

    pub async fn send(&mut self, stream: u64, message: PhaseMessage) {
        write_frame(&mut self.writer, &InboundFrame::Message { stream, message })
            .await
            .unwrap();
    }

    pub async fn end(&mut self, stream: u64) {
        write_frame(&mut self.writer, &InboundFrame::End { stream })
            .await
            .unwrap();
    }

    pub async fn abort(&mut self, stream: u64, reason: &str) {
        let frame = InboundFrame::Abort {
            stream,
            reason: reason.to_string(),
        };
        write_frame(&mut self.writer, &frame).await.unwrap();
    }

    pub async fn send_raw(&mut self, line: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.writer.write_all(line).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next outbound frame; `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.next::<OutboundFrame>())
            .await
            .expect("timed out waiting for a frame")
            .unwrap_or(None)
    }

    /// Next frame, which must be a response on `stream`.
    pub async fn recv_response(&mut self, stream: u64) -> ProcessingResponse {
        match self.recv().await {
            Some(OutboundFrame::Response { stream: s, response }) if s == stream => response,
            other => panic!("expected response on stream {stream}, got {other:?}"),
        }
    }

    /// Send `message` on `stream` and return its response.
    pub async fn call(&mut self, stream: u64, message: PhaseMessage) -> ProcessingResponse {
        self.send(stream, message).await;
        self.recv_response(stream).await
    }
}

pub fn request_headers() -> PhaseMessage {
    PhaseMessage::RequestHeaders(HttpHeaders::from_pairs([
        (":method", "POST"),
        (":path", "/upload"),
    ]))
}

pub fn request_headers_with_id(id: &str) -> PhaseMessage {
    PhaseMessage::RequestHeaders(HttpHeaders::from_pairs([
        (":method", "POST"),
        (":path", "/upload"),
        ("x-request-id", id),
    ]))
}

pub fn body(chunk: &str, end_of_stream: bool) -> PhaseMessage {
    PhaseMessage::RequestBody(HttpBody::chunk(chunk.as_bytes(), end_of_stream))
}

pub fn trailers() -> PhaseMessage {
    PhaseMessage::RequestTrailers(HttpTrailers::default())
}

pub fn response_headers() -> PhaseMessage {
    PhaseMessage::ResponseHeaders(HttpHeaders::from_pairs([(":status", "200")]))
}

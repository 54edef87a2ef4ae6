//! Failure injection tests: dropped connections, bad framing, limits, shutdown.

use std::time::Duration;

use callout_buffering::net::OutboundFrame;
use callout_buffering::protocol::PhaseKind;

mod common;
use common::*;

#[tokio::test]
async fn dropped_connection_deletes_open_transactions() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.call(2, request_headers()).await;
    client.call(1, body("partial", false)).await;
    assert_eq!(server.store.len(), 2);

    assert_eq!(server.tracker.active_count(), 1);

    drop(client);
    wait_until_empty(&server.store).await;
    tokio::time::timeout(Duration::from_secs(5), server.tracker.wait_for_drain())
        .await
        .expect("connection not released");
    server.stop().await;
}

#[tokio::test]
async fn abort_frame_deletes_transaction_and_frees_stream_number() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.abort(1, "client reset").await;
    wait_until_empty(&server.store).await;

    // The stream number can be reused for a fresh transaction.
    client.call(1, request_headers()).await;
    client.call(1, body("xyz", true)).await;
    let response = client.call(1, response_headers()).await;
    assert_eq!(response.header_mutation().unwrap().get("x-body-size"), Some("3"));

    server.stop().await;
}

#[tokio::test]
async fn malformed_frame_closes_connection_only() {
    let server = start_server(test_config()).await;
    let mut bad = server.connect().await;
    let mut good = server.connect().await;

    bad.call(1, request_headers()).await;
    good.call(1, request_headers()).await;

    bad.send_raw(b"{this is not json}\n").await;
    match bad.recv().await {
        Some(OutboundFrame::Error { stream: 0, message }) => {
            assert!(message.contains("malformed"), "{message}");
        }
        other => panic!("expected connection error frame, got {other:?}"),
    }
    assert!(bad.recv().await.is_none());

    // The healthy connection is unaffected.
    good.call(1, body("ok", true)).await;
    let response = good.call(1, response_headers()).await;
    assert_eq!(response.header_mutation().unwrap().get("x-body-size"), Some("2"));

    good.end(1).await;
    wait_until_empty(&server.store).await;
    server.stop().await;
}

#[tokio::test]
async fn excess_streams_are_refused() {
    let mut config = test_config();
    config.listener.max_streams_per_connection = 2;
    let server = start_server(config).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.call(2, request_headers()).await;

    client.send(3, request_headers()).await;
    match client.recv().await {
        Some(OutboundFrame::Error { stream: 3, message }) => {
            assert!(message.contains("too many"), "{message}");
        }
        other => panic!("expected refusal for stream 3, got {other:?}"),
    }
    assert_eq!(server.store.len(), 2);

    // Ending one stream makes room.
    client.end(1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let response = client.call(3, request_headers()).await;
    assert_eq!(response.kind(), PhaseKind::RequestHeaders);

    server.stop().await;
}

#[tokio::test]
async fn oversized_frame_is_connection_fatal() {
    let mut config = test_config();
    config.listener.max_frame_bytes = 256;
    let server = start_server(config).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.send(1, body(&"x".repeat(1024), true)).await;
    match client.recv().await {
        Some(OutboundFrame::Error { stream: 0, message }) => {
            assert!(message.contains("exceeds"), "{message}");
        }
        other => panic!("expected frame size error, got {other:?}"),
    }
    wait_until_empty(&server.store).await;
    server.stop().await;
}

#[tokio::test]
async fn shutdown_drains_then_closes_idle_connections() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;
    client.call(1, request_headers()).await;

    let store = server.store.clone();
    let started = tokio::time::Instant::now();
    server.stop().await;

    // drain_timeout_secs = 1 in the test config.
    assert!(started.elapsed() >= Duration::from_millis(900));
    wait_until_empty(&store).await;
    assert!(client.recv().await.is_none());
}

#[tokio::test]
async fn new_streams_refused_while_draining() {
    let mut config = test_config();
    config.shutdown.drain_timeout_secs = 5;
    let server = start_server(config).await;
    let mut client = server.connect().await;
    client.call(1, request_headers()).await;

    server.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.send(2, request_headers()).await;
    match client.recv().await {
        Some(OutboundFrame::Error { stream: 2, message }) => {
            assert!(message.contains("shutting down"), "{message}");
        }
        other => panic!("expected refusal while draining, got {other:?}"),
    }

    // Open streams keep working until the client leaves.
    let response = client.call(1, body("done", true)).await;
    assert_eq!(response.kind(), PhaseKind::RequestBody);
    client.end(1).await;
    drop(client);

    tokio::time::timeout(Duration::from_secs(3), server.handle)
        .await
        .expect("server should finish once the connection closes")
        .unwrap()
        .unwrap();
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn idle_transactions_are_swept() {
    let mut config = test_config();
    config.buffering.idle_timeout_secs = 1;
    config.buffering.sweep_interval_secs = Some(1);
    let server = start_server(config).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    assert_eq!(server.store.len(), 1);

    // Connection stays open but the transaction is abandoned.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(server.store.is_empty());

    // Later events on the evicted transaction pass through.
    let response = client.call(1, body("late", true)).await;
    assert_eq!(response.kind(), PhaseKind::RequestBody);
    assert!(response.header_mutation().is_none());

    server.stop().await;
}

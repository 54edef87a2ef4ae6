//! End-to-end exchanges over the reference transport.

use callout_buffering::protocol::{BodySendMode, PhaseKind, PhaseMessage};
use callout_buffering::TransactionId;

mod common;
use common::*;

#[tokio::test]
async fn mutation_rides_on_response_headers() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    let first = client.call(1, request_headers()).await;
    assert_eq!(first.kind(), PhaseKind::RequestHeaders);
    let mode = first.mode_override.expect("buffered delivery requested");
    assert_eq!(mode.request_body_mode, BodySendMode::Buffered);
    assert_eq!(mode.response_body_mode, BodySendMode::Buffered);

    assert!(client.call(1, body("abc", false)).await.header_mutation().is_none());
    assert!(client.call(1, body("def", true)).await.header_mutation().is_none());

    let response = client.call(1, response_headers()).await;
    assert_eq!(response.kind(), PhaseKind::ResponseHeaders);
    let mutation = response.header_mutation().expect("mutation on response headers");
    assert_eq!(mutation.get("x-body-size"), Some("6"));
    assert_eq!(mutation.get("x-body-format"), Some("text"));

    client.end(1).await;
    wait_until_empty(&server.store).await;
    server.stop().await;
}

#[tokio::test]
async fn early_response_headers_move_mutation_to_final_chunk() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.call(1, body("abc", false)).await;
    let early = client.call(1, response_headers()).await;
    assert!(early.header_mutation().is_none());

    let last = client.call(1, body("def", true)).await;
    assert_eq!(last.kind(), PhaseKind::RequestBody);
    assert_eq!(last.header_mutation().unwrap().get("x-body-size"), Some("6"));

    client.end(1).await;
    wait_until_empty(&server.store).await;
    server.stop().await;
}

#[tokio::test]
async fn trailers_freeze_body_and_trigger_mutation() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.call(1, body("<status>warning</status>", false)).await;
    assert!(client.call(1, response_headers()).await.header_mutation().is_none());

    let response = client.call(1, trailers()).await;
    assert_eq!(response.kind(), PhaseKind::RequestTrailers);
    let mutation = response.header_mutation().unwrap();
    assert_eq!(mutation.get("x-body-format"), Some("xml"));
    assert_eq!(mutation.get("x-body-has-warning"), Some("true"));

    server.stop().await;
}

#[tokio::test]
async fn interleaved_streams_keep_their_own_bytes() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.call(2, request_headers()).await;
    client.call(1, body("aa", false)).await;
    client.call(2, body("bbbb", false)).await;
    client.call(1, body("aa", true)).await;
    client.call(2, body("bbbb", false)).await;
    client.call(2, body("{\"error\":true}", true)).await;

    let one = client.call(1, response_headers()).await;
    let two = client.call(2, response_headers()).await;
    assert_eq!(one.header_mutation().unwrap().get("x-body-size"), Some("4"));
    assert_eq!(one.header_mutation().unwrap().get("x-body-has-error"), None);
    assert_eq!(two.header_mutation().unwrap().get("x-body-size"), Some("22"));
    assert_eq!(two.header_mutation().unwrap().get("x-body-has-error"), Some("true"));

    client.end(1).await;
    client.end(2).await;
    wait_until_empty(&server.store).await;
    server.stop().await;
}

#[tokio::test]
async fn client_request_id_used_when_stream_identity_disabled() {
    let mut config = test_config();
    config.correlation.prefer_stream_identity = false;
    let server = start_server(config).await;
    let mut client = server.connect().await;

    client.call(1, request_headers_with_id("req-7")).await;
    let live = server.store.get(&TransactionId::from("req-7")).expect("keyed by header");
    assert!(live.awaiting_completion);

    client.end(1).await;
    wait_until_empty(&server.store).await;
    server.stop().await;
}

#[tokio::test]
async fn events_before_request_headers_pass_through() {
    let server = start_server(test_config()).await;
    let mut client = server.connect().await;

    let response = client.call(5, body("orphan", true)).await;
    assert_eq!(response.kind(), PhaseKind::RequestBody);
    assert!(response.header_mutation().is_none());
    assert!(server.store.is_empty());

    let response = client
        .call(5, PhaseMessage::ResponseTrailers(Default::default()))
        .await;
    assert_eq!(response.kind(), PhaseKind::ResponseTrailers);

    server.stop().await;
}

#[tokio::test]
async fn overflow_passes_through_without_mutation() {
    let mut config = test_config();
    config.buffering.max_body_bytes = 4;
    let server = start_server(config).await;
    let mut client = server.connect().await;

    client.call(1, request_headers()).await;
    client.call(1, body("abc", false)).await;
    let dropped = client.call(1, body("defgh", true)).await;
    assert!(dropped.header_mutation().is_none());

    let response = client.call(1, response_headers()).await;
    assert_eq!(response.kind(), PhaseKind::ResponseHeaders);
    assert!(response.header_mutation().is_none());

    server.stop().await;
}

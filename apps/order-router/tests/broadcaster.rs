//! JSON-RPC broadcaster against a mock CometBFT node.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use order_router::application::ports::{ChainError, ChainPort};
use order_router::infrastructure::chain::{Broadcaster, tx_hash};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TX: &[u8] = br#"{"chain_id":"dydx-testnet-4","messages":[]}"#;

fn broadcaster(server: &MockServer, timeout: Duration) -> Broadcaster {
    let mut broadcaster = Broadcaster::new(server.uri(), timeout).unwrap();
    broadcaster.set_poll_interval(Duration::from_millis(20));
    broadcaster
}

fn broadcast_ok(hash: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"code": 0, "data": "", "log": "[]", "codespace": "", "hash": hash}
    }))
}

fn tx_not_found(hash: &str) -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {"code": -32603, "message": "Internal error", "data": format!("tx ({hash}) not found")}
    }))
}

fn tx_included(hash: &str, code: u32) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "hash": hash,
            "height": "1200345",
            "index": 0,
            "tx_result": {"code": code, "log": "", "gas_wanted": "300000", "gas_used": "123456"}
        }
    }))
}

#[tokio::test]
async fn broadcast_then_poll_until_included() {
    let server = MockServer::start().await;
    let hash = tx_hash(TX);
    let raw_hash = hex::decode(&hash).unwrap();

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "broadcast_tx_sync",
            "params": {"tx": BASE64.encode(TX)}
        })))
        .respond_with(broadcast_ok(&hash))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tx"})))
        .respond_with(tx_not_found(&hash))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "tx",
            "params": {"hash": BASE64.encode(raw_hash), "prove": false}
        })))
        .respond_with(tx_included(&hash, 0))
        .mount(&server)
        .await;

    let response = broadcaster(&server, Duration::from_secs(5))
        .broadcast_and_wait(TX, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.tx_hash, hash);
    assert!(response.is_success());
    assert_eq!(response.height, 1_200_345);
    assert_eq!(response.gas_used, 123_456);
    assert_eq!(response.gas_wanted, 300_000);
}

#[tokio::test]
async fn included_failure_code_is_returned_not_raised() {
    let server = MockServer::start().await;
    let hash = tx_hash(TX);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tx"})))
        .respond_with(tx_included(&hash, 11))
        .mount(&server)
        .await;

    let response = broadcaster(&server, Duration::from_secs(5))
        .poll_confirmation(&hash, Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.code, 11);
    assert!(!response.is_success());
}

#[tokio::test]
async fn check_tx_rejection_skips_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "broadcast_tx_sync"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"code": 5, "log": "insufficient funds", "hash": ""}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tx"})))
        .respond_with(tx_included("X", 0))
        .expect(0)
        .mount(&server)
        .await;

    let err = broadcaster(&server, Duration::from_secs(5))
        .broadcast_and_wait(TX, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChainError::Broadcast {
            code: 5,
            log: "insufficient funds".into()
        }
    );
}

#[tokio::test]
async fn never_included_times_out() {
    let server = MockServer::start().await;
    let hash = tx_hash(TX);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "broadcast_tx_sync"})))
        .respond_with(broadcast_ok(&hash))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tx"})))
        .respond_with(tx_not_found(&hash))
        .mount(&server)
        .await;

    let err = broadcaster(&server, Duration::from_millis(150))
        .broadcast_and_wait(TX, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::ConfirmationTimeout { ref tx_hash, timeout }
            if *tx_hash == hash && timeout == Duration::from_millis(150)
    ));
}

#[tokio::test]
async fn cancellation_stops_polling() {
    let server = MockServer::start().await;
    let hash = tx_hash(TX);
    Mock::given(method("POST"))
        .respond_with(tx_not_found(&hash))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.cancel();
    });
    let err = broadcaster(&server, Duration::from_secs(30))
        .poll_confirmation(&hash, Duration::from_secs(30), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ChainError::Cancelled);
}

#[tokio::test]
async fn retry_broadcast_recovers_from_unavailable_node() {
    let server = MockServer::start().await;
    let hash = tx_hash(TX);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "broadcast_tx_sync"})))
        .respond_with(broadcast_ok(&hash))
        .mount(&server)
        .await;

    let returned = broadcaster(&server, Duration::from_secs(5))
        .retry_broadcast(TX, 2, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(returned, hash);
}

#[tokio::test]
async fn retry_broadcast_does_not_retry_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"code": 32, "log": "account sequence mismatch"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = broadcaster(&server, Duration::from_secs(5))
        .retry_broadcast(TX, 3, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Broadcast { code: 32, .. }));
}

//! Remote signer against a mock signing service.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use order_router::application::ports::{SignerError, SignerPort};
use order_router::infrastructure::signer::RemoteSigner;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signer(server: &MockServer) -> RemoteSigner {
    RemoteSigner::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn address_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/address"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"address": "dydx1signer"})))
        .expect(1)
        .mount(&server)
        .await;

    let signer = signer(&server);
    assert_eq!(signer.address().await.unwrap(), "dydx1signer");
    assert_eq!(signer.address().await.unwrap(), "dydx1signer");
}

#[tokio::test]
async fn payload_and_signature_are_base64() {
    let server = MockServer::start().await;
    let payload = b"sign-doc bytes";
    let signature = [7_u8; 64];
    Mock::given(method("POST"))
        .and(path("/sign"))
        .and(body_json(json!({"payload": BASE64.encode(payload)})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"signature": BASE64.encode(signature)})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let signed = signer(&server).sign_bytes(payload).await.unwrap();
    assert_eq!(signed, signature.to_vec());
}

#[tokio::test]
async fn server_errors_mean_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let err = signer(&server).sign_bytes(b"x").await.unwrap_err();
    assert!(matches!(err, SignerError::Unavailable { .. }));
}

#[tokio::test]
async fn client_errors_and_bad_signatures_fail_signing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/address"))
        .respond_with(ResponseTemplate::new(403).set_body_string("locked"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"signature": "%%%"})))
        .mount(&server)
        .await;

    let signer = signer(&server);
    assert!(matches!(
        signer.address().await,
        Err(SignerError::SigningFailed { .. })
    ));
    assert!(matches!(
        signer.sign_bytes(b"x").await,
        Err(SignerError::SigningFailed { .. })
    ));
}

#[tokio::test]
async fn unreachable_service_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let signer = RemoteSigner::new(uri, Duration::from_millis(500)).unwrap();
    assert!(matches!(
        signer.address().await,
        Err(SignerError::Unavailable { .. })
    ));
}

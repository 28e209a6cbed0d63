//! `ReqwestTransport` against a live HTTP server.

#![allow(clippy::unwrap_used)]

use storefront_session::{ApiRequest, HttpTransport, ReqwestTransport, TransportError};
use storefront_session_integration_tests::{API_KEY, MockPlatform};

#[tokio::test]
async fn test_default_headers_are_sent() {
    let platform = MockPlatform::start().await;
    let transport = ReqwestTransport::new(&platform.platform_config(5)).unwrap();

    transport.send(ApiRequest::get("/debug/echo")).await.unwrap();

    assert_eq!(platform.last_header("x-api-key").as_deref(), Some(API_KEY));
    assert_eq!(platform.last_header("accept").as_deref(), Some("application/json"));
    assert!(
        platform
            .last_header("user-agent")
            .unwrap()
            .starts_with("storefront-session/")
    );
    assert_eq!(platform.last_header("authorization"), None);
}

#[tokio::test]
async fn test_query_and_authorization_reach_server() {
    let platform = MockPlatform::start().await;
    let transport = ReqwestTransport::new(&platform.platform_config(5)).unwrap();

    let request = ApiRequest::get("debug/echo")
        .query("page", "2")
        .query("q", "linen shirt")
        .with_authorization(Some("Bearer abc".to_string()));
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["query"]["page"], "2");
    assert_eq!(response.body["data"]["query"]["q"], "linen shirt");
    assert_eq!(platform.last_header("authorization").as_deref(), Some("Bearer abc"));
}

#[tokio::test]
async fn test_non_json_error_uses_reason_phrase() {
    let platform = MockPlatform::start().await;
    let transport = ReqwestTransport::new(&platform.platform_config(5)).unwrap();

    let err = transport.send(ApiRequest::get("/debug/teapot")).await.unwrap_err();

    match err {
        TransportError::Status {
            status,
            message,
            body,
        } => {
            assert_eq!(status, 418);
            assert_eq!(message, "I'm a teapot");
            assert!(body.is_none());
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_json_error_carries_platform_message() {
    let platform = MockPlatform::start().await;
    let transport = ReqwestTransport::new(&platform.platform_config(5)).unwrap();

    let err = transport
        .send(ApiRequest::get("/customer/profile"))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert!(!err.is_transient());
    assert!(err.to_string().contains("Unauthenticated"));
}

#[tokio::test]
async fn test_non_json_success_is_decode_error() {
    let platform = MockPlatform::start().await;
    let transport = ReqwestTransport::new(&platform.platform_config(5)).unwrap();

    let err = transport.send(ApiRequest::get("/debug/text")).await.unwrap_err();

    assert!(matches!(err, TransportError::Decode(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let platform = MockPlatform::start().await;
    let transport = ReqwestTransport::new(&platform.platform_config(1)).unwrap();

    let err = transport.send(ApiRequest::get("/debug/slow")).await.unwrap_err();

    assert!(matches!(err, TransportError::Timeout));
}

#[tokio::test]
async fn test_unreachable_platform_is_network_error() {
    let platform = MockPlatform::start().await;
    let config = platform.platform_config(5);
    drop(platform);
    tokio::task::yield_now().await;

    let transport = ReqwestTransport::new(&config).unwrap();
    let err = transport.send(ApiRequest::get("/debug/echo")).await.unwrap_err();

    assert!(matches!(
        err,
        TransportError::Network(_) | TransportError::Timeout
    ));
}

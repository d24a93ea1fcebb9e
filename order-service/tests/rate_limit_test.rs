mod common;

use axum::http::StatusCode;
use common::{user_token, TestApp, TEST_USER_ID};
use serde_json::json;

#[tokio::test]
async fn storefront_routes_are_limited_per_ip() {
    let app = TestApp::with_options(false, 2).await;
    let token = user_token(TEST_USER_ID);
    let headers = [("token", token.as_str()), ("x-forwarded-for", "203.0.113.7")];

    for _ in 0..2 {
        let (status, _) = app.post("/api/cart/get", &headers, json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/cart/get")
        .header("content-type", "application/json")
        .header("token", token.as_str())
        .header("x-forwarded-for", "203.0.113.7")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Other clients keep their own budget
    let other = [("token", token.as_str()), ("x-forwarded-for", "198.51.100.1")];
    let (status, _) = app.post("/api/cart/get", &other, json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn webhook_is_never_limited() {
    let app = TestApp::with_options(false, 1).await;
    let event = json!({
        "id": "evt_ping",
        "object": "event",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1", "object": "customer" } }
    });

    for _ in 0..5 {
        let body = event.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = service_core::utils::signature::sign_timestamped(
            common::WEBHOOK_SECRET,
            timestamp,
            body.as_bytes(),
        )
        .unwrap();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/order/webhook")
            .header("stripe-signature", format!("t={},v1={}", timestamp, signature))
            .header("x-forwarded-for", "203.0.113.9")
            .body(axum::body::Body::from(body))
            .unwrap();
        let (status, _) = app.request(request).await;
        assert_eq!(status, StatusCode::OK);
    }
}

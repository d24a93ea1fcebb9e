mod common;

use axum::http::StatusCode;
use common::{checkout_completed, checkout_expired, order_body, TestApp, TEST_USER_ID};
use order_service::models::OrderStatus;
use order_service::services::{CartStore, OrderStore};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

async fn seed_cart(app: &TestApp, user_id: &str) {
    let (status, _) = app
        .post_as(
            user_id,
            "/api/cart/add",
            json!({ "itemId": "shoe-1", "size": "M" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

async fn place_card_order(app: &TestApp) -> String {
    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/stripe", order_body(500.0))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    body["orderId"].as_str().unwrap().to_string()
}

// ============================================================================
// Cash on delivery
// ============================================================================

#[tokio::test]
async fn cod_order_is_placed_and_cart_cleared() {
    let app = TestApp::new().await;
    seed_cart(&app, TEST_USER_ID).await;

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/place", order_body(500.0))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["order"]["status"], "Order Placed");
    assert_eq!(body["order"]["paymentMethod"], "COD");
    assert_eq!(body["order"]["payment"], false);
    assert_eq!(body["order"]["amount"], 500.0);
    assert_eq!(body["order"]["items"][0]["priceAtOrderTime"], 245.0);

    assert!(app.store.find_cart(TEST_USER_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn amount_mismatch_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/place", order_body(1.0))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(app.store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn place_order_requires_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/order/place", &[], order_body(500.0))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn body_user_must_match_token() {
    let app = TestApp::new().await;
    let mut body = order_body(500.0);
    body["userId"] = json!("someone-else");

    let (status, _) = app
        .post_as(TEST_USER_ID, "/api/order/place", body)
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_order_fails_validation() {
    let app = TestApp::new().await;
    let mut body = order_body(10.0);
    body["items"] = json!([]);

    let (status, _) = app.post_as(TEST_USER_ID, "/api/order/place", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Card checkout and webhook
// ============================================================================

#[tokio::test]
async fn card_checkout_is_confirmed_by_webhook() {
    let app = TestApp::new().await;
    app.mock_checkout_session("cs_test_1", 1).await;
    seed_cart(&app, TEST_USER_ID).await;

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/stripe", order_body(500.0))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["sessionId"], "cs_test_1");
    assert!(body["sessionUrl"].as_str().unwrap().contains("cs_test_1"));
    let order_id = body["orderId"].as_str().unwrap().to_string();

    let pending = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(pending.status, OrderStatus::Pending);
    assert!(!pending.payment);
    assert_eq!(pending.gateway_session_id.as_deref(), Some("cs_test_1"));
    // Cart stays until payment is confirmed
    assert!(app.store.find_cart(TEST_USER_ID).await.unwrap().is_some());

    let requests = app.stripe.received_requests().await.unwrap();
    let form = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(form.contains("24500"));
    assert!(form.contains("1000"));
    assert!(form.contains(&order_id));

    let (status, body) = app
        .send_webhook(&checkout_completed("evt_1", &order_id, TEST_USER_ID, "paid"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let paid = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert!(paid.payment);
    assert_eq!(paid.status, OrderStatus::Placed);
    assert!(app.store.find_cart(TEST_USER_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn redelivered_event_is_a_no_op() {
    let app = TestApp::new().await;
    app.mock_checkout_session("cs_test_1", 1).await;
    let order_id = place_card_order(&app).await;

    let event = checkout_completed("evt_1", &order_id, TEST_USER_ID, "paid");
    let (status, _) = app.send_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    let first = app.store.find_order(&order_id).await.unwrap().unwrap();

    // A cart built after confirmation must survive the redelivery
    seed_cart(&app, TEST_USER_ID).await;

    let (status, _) = app.send_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);

    let second = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(second.status, OrderStatus::Placed);
    assert_eq!(second.updated_at, first.updated_at);
    assert!(app.store.find_cart(TEST_USER_ID).await.unwrap().is_some());
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_mutation() {
    let app = TestApp::new().await;
    app.mock_checkout_session("cs_test_1", 1).await;
    let order_id = place_card_order(&app).await;

    let body = checkout_completed("evt_1", &order_id, TEST_USER_ID, "paid").to_string();
    let timestamp = chrono::Utc::now().timestamp();
    let forged = format!("t={},v1={}", timestamp, "0".repeat(64));

    let (status, response) = app.send_raw_webhook(body.clone(), Some(&forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);

    let (status, _) = app.send_raw_webhook(body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let expired = checkout_expired("evt_2", &order_id, TEST_USER_ID).to_string();
    let (status, _) = app.send_raw_webhook(expired.clone(), Some(&forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.send_raw_webhook(expired, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.payment);
}

#[tokio::test]
async fn admin_cannot_move_unpaid_order_forward() {
    for strict in [true, false] {
        let app = TestApp::with_options(strict, 1000).await;
        app.mock_checkout_session("cs_test_1", 1).await;
        seed_cart(&app, TEST_USER_ID).await;
        let order_id = place_card_order(&app).await;

        let (status, body) = app
            .post_admin(
                "/api/order/status",
                json!({ "orderId": order_id, "status": "Processing" }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "strict={} body: {}", strict, body);

        let (status, _) = app
            .send_webhook(&checkout_completed("evt_1", &order_id, TEST_USER_ID, "paid"))
            .await;
        assert_eq!(status, StatusCode::OK);

        let order = app.store.find_order(&order_id).await.unwrap().unwrap();
        assert!(order.payment);
        assert_eq!(order.status, OrderStatus::Placed);
        assert!(app.store.find_cart(TEST_USER_ID).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged() {
    let app = TestApp::new().await;
    let event = json!({
        "id": "evt_unrelated",
        "object": "event",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1", "object": "customer" } }
    });

    let (status, body) = app.send_webhook(&event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn events_with_null_fields_are_acknowledged() {
    let app = TestApp::new().await;
    let event = json!({
        "id": "evt_nulls",
        "object": "event",
        "type": "invoice.paid",
        "data": { "object": {
            "id": "in_1",
            "object": "invoice",
            "metadata": null,
            "payment_method_types": null
        } }
    });

    let (status, body) = app.send_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn unpaid_completion_leaves_order_pending() {
    let app = TestApp::new().await;
    app.mock_checkout_session("cs_test_1", 1).await;
    let order_id = place_card_order(&app).await;

    let (status, _) = app
        .send_webhook(&checkout_completed("evt_1", &order_id, TEST_USER_ID, "unpaid"))
        .await;

    assert_eq!(status, StatusCode::OK);
    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn expired_session_marks_payment_failed() {
    let app = TestApp::new().await;
    app.mock_checkout_session("cs_test_1", 1).await;
    let order_id = place_card_order(&app).await;
    seed_cart(&app, TEST_USER_ID).await;

    let (status, _) = app
        .send_webhook(&checkout_expired("evt_2", &order_id, TEST_USER_ID))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::PaymentFailed);
    assert!(!order.payment);
    assert!(app.store.find_cart(TEST_USER_ID).await.unwrap().is_some());
}

#[tokio::test]
async fn gateway_outage_marks_order_failed() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "type": "api_error", "message": "Something went wrong" }
        })))
        .mount(&app.stripe)
        .await;

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/stripe", order_body(500.0))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    let orders = app.store.list_orders().await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::PaymentFailed);
}

#[tokio::test]
async fn gateway_timeout_is_retryable() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "cs_slow", "url": null }))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&app.stripe)
        .await;

    let (status, _) = app
        .post_as(TEST_USER_ID, "/api/order/stripe", order_body(500.0))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let orders = app.store.list_orders().await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::PaymentFailed);
}

#[tokio::test]
async fn gateway_rejection_is_not_retryable() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "invalid_request_error", "message": "Invalid currency" }
        })))
        .mount(&app.stripe)
        .await;

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/stripe", order_body(500.0))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["retryable"], false);
}

// ============================================================================
// Status administration
// ============================================================================

async fn place_cod(app: &TestApp) -> String {
    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/place", order_body(500.0))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    body["order"]["_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn admin_advances_status() {
    let app = TestApp::new().await;
    let order_id = place_cod(&app).await;

    let (status, body) = app
        .post_admin(
            "/api/order/status",
            json!({ "orderId": order_id, "status": "Processing" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "Processing");
}

#[tokio::test]
async fn invalid_status_leaves_order_unchanged() {
    let app = TestApp::new().await;
    let order_id = place_cod(&app).await;

    let (status, _) = app
        .post_admin(
            "/api/order/status",
            json!({ "orderId": order_id, "status": "Teleported" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post_admin(
            "/api/order/status",
            json!({ "orderId": "does-not-exist", "status": "Shipped" }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_update_requires_admin_key() {
    let app = TestApp::new().await;
    let order_id = place_cod(&app).await;

    let (status, _) = app
        .post_as(
            TEST_USER_ID,
            "/api/order/status",
            json!({ "orderId": order_id, "status": "Shipped" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/order/status",
            &[("x-admin-api-key", "wrong-key")],
            json!({ "orderId": order_id, "status": "Shipped" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
}

#[tokio::test]
async fn skipping_states_depends_on_mode() {
    let permissive = TestApp::new().await;
    let order_id = place_cod(&permissive).await;
    let (status, body) = permissive
        .post_admin(
            "/api/order/status",
            json!({ "orderId": order_id, "status": "Delivered" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "Delivered");

    let strict = TestApp::with_options(true, 1000).await;
    let order_id = place_cod(&strict).await;
    let (status, _) = strict
        .post_admin(
            "/api/order/status",
            json!({ "orderId": order_id, "status": "Delivered" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let order = strict.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
}

#[tokio::test]
async fn admin_lists_all_orders_newest_first() {
    let app = TestApp::new().await;
    let first = place_cod(&app).await;
    // Timestamps have millisecond resolution
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, _) = app
        .post_as("user-2", "/api/order/place", order_body(500.0))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post_admin("/api/order/list", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1]["_id"], first.as_str());

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/userorders", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["userId"], TEST_USER_ID);
}

// ============================================================================
// Customer cancellation
// ============================================================================

#[tokio::test]
async fn owner_cancels_placed_order() {
    let app = TestApp::new().await;
    let order_id = place_cod(&app).await;

    let (status, _) = app
        .post_as("user-2", "/api/order/cancel", json!({ "orderId": order_id }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post_as(TEST_USER_ID, "/api/order/cancel", json!({ "orderId": order_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "Cancelled");
    assert_eq!(body["order"]["cancelledBy"], "user");

    let (status, _) = app
        .post_as(TEST_USER_ID, "/api/order/cancel", json!({ "orderId": order_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

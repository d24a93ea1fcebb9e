#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use order_service::config::{
    AuthConfig, CheckoutConfig, Environment, OrderConfig, RateLimitBackend, RateLimitConfig,
    RedisConfig, StoreBackend, StoreConfig, StripeConfig,
};
use order_service::models::Product;
use order_service::services::{MemoryStore, StripeClient};
use order_service::{build_router, AppState, Application};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::middleware::rate_limit::{GovernorRateLimit, SharedRateLimiter};
use service_core::utils::signature::sign_timestamped;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const STRIPE_KEY: &str = "sk_test_123";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_USER_ID: &str = "user-1";

pub fn test_config(stripe_base_url: &str, strict_transitions: bool) -> OrderConfig {
    OrderConfig {
        common: service_core::config::Config {
            port: 0,
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        },
        environment: Environment::Dev,
        service_name: "order-service-test".to_string(),
        store: StoreConfig {
            backend: StoreBackend::Memory,
            url: Secret::new(String::new()),
            database: "order_test".to_string(),
        },
        redis: RedisConfig {
            url: Secret::new("redis://localhost:6379".to_string()),
        },
        auth: AuthConfig {
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
            admin_api_key: Secret::new(ADMIN_KEY.to_string()),
        },
        stripe: StripeConfig {
            secret_key: Secret::new(STRIPE_KEY.to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: stripe_base_url.to_string(),
            timeout_secs: 1,
            webhook_tolerance_secs: 300,
        },
        checkout: CheckoutConfig {
            currency: "usd".to_string(),
            delivery_fee: 10.0,
            frontend_url: "http://shop.test".to_string(),
            strict_transitions,
        },
        rate_limit: RateLimitConfig {
            backend: RateLimitBackend::Memory,
            per_minute: 1000,
        },
        allowed_origins: vec!["http://shop.test".to_string()],
    }
}

/// Router-level harness over the in-memory store and a mocked Stripe API.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub stripe: MockServer,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(false, 1000).await
    }

    pub async fn with_options(strict_transitions: bool, requests_per_minute: u32) -> Self {
        let stripe = MockServer::start().await;
        let config = test_config(&stripe.uri(), strict_transitions);

        let store = MemoryStore::new();
        store.insert_product(Product {
            id: "shoe-1".to_string(),
            name: "Trail Runner".to_string(),
            price: 245.0,
            sizes: vec!["M".to_string(), "L".to_string()],
        });
        store.insert_product(Product {
            id: "hat-1".to_string(),
            name: "Wool Hat".to_string(),
            price: 20.0,
            sizes: vec![],
        });

        let gateway = StripeClient::new(config.stripe.clone()).expect("stripe client");
        let rate_limiter: SharedRateLimiter =
            Arc::new(GovernorRateLimit::new(requests_per_minute, 60));
        let shared = Arc::new(store.clone());

        let state = AppState::from_parts(
            config,
            None,
            shared.clone(),
            shared.clone(),
            shared,
            Arc::new(gateway),
            rate_limiter,
        );

        Self {
            router: build_router(state),
            store,
            stripe,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(self.router.clone(), request).await
    }

    pub async fn post(&self, uri: &str, headers: &[(&str, &str)], body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_as(&self, user_id: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let token = user_token(user_id);
        self.post(uri, &[("token", token.as_str())], body).await
    }

    pub async fn post_admin(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post(uri, &[("x-admin-api-key", ADMIN_KEY)], body).await
    }

    /// Deliver `event` signed with the endpoint secret.
    pub async fn send_webhook(&self, event: &Value) -> (StatusCode, Value) {
        let body = event.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_timestamped(WEBHOOK_SECRET, timestamp, body.as_bytes()).unwrap();
        let header_value = format!("t={},v1={}", timestamp, signature);
        self.send_raw_webhook(body, Some(&header_value)).await
    }

    pub async fn send_raw_webhook(&self, body: String, signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/order/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        self.request(builder.body(Body::from(body)).unwrap()).await
    }

    /// Stripe accepts exactly `times` session creations.
    pub async fn mock_checkout_session(&self, session_id: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/checkout/sessions"))
            .and(header("authorization", format!("Bearer {}", STRIPE_KEY).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": session_id,
                "object": "checkout.session",
                "url": format!("https://checkout.stripe.test/{}", session_id)
            })))
            .expect(times)
            .mount(&self.stripe)
            .await;
    }
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, body)
}

pub fn user_token(user_id: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "id": user_id }),
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn address() -> Value {
    json!({
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "ada@example.com",
        "street": "1 Analytical Way",
        "city": "London",
        "state": "LDN",
        "zipcode": "N1 9GU",
        "country": "UK",
        "phone": "+44 20 0000 0000"
    })
}

/// Two Trail Runners at 245 plus the 10 delivery fee: 500.
pub fn order_body(amount: f64) -> Value {
    json!({
        "items": [{ "productId": "shoe-1", "size": "M", "quantity": 2 }],
        "amount": amount,
        "address": address()
    })
}

pub fn checkout_completed(event_id: &str, order_id: &str, user_id: &str, payment_status: &str) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "object": "checkout.session",
            "payment_status": payment_status,
            "payment_intent": "pi_test_1",
            "payment_method_types": ["card"],
            "metadata": { "orderId": order_id, "userId": user_id }
        }}
    })
}

pub fn checkout_expired(event_id: &str, order_id: &str, user_id: &str) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.expired",
        "data": { "object": {
            "id": "cs_test_1",
            "object": "checkout.session",
            "payment_status": "unpaid",
            "metadata": { "orderId": order_id, "userId": user_id }
        }}
    })
}

/// Spawn a real server on a random port over the in-memory store.
pub async fn spawn_server() -> String {
    let config = test_config("http://127.0.0.1:9", false);
    let app = Application::build(config)
        .await
        .expect("Failed to build test application");
    let address = format!("http://127.0.0.1:{}", app.port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    // Wait for the server to accept connections
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client
            .get(format!("{}/health", address))
            .send()
            .await
            .is_ok()
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    address
}

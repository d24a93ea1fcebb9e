//! Application startup and lifecycle management.

use crate::config::{OrderConfig, RateLimitBackend, StoreBackend};
use crate::handlers;
use crate::services::{
    init_metrics, CartService, CartStore, MemoryStore, MongoStore, OrderService, OrderStore,
    PaymentGateway, ProductCatalog, Reconciler, StripeClient,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client, Database};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, GovernorRateLimit, RedisRateLimit, SharedRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OrderConfig>,
    /// Present only with the MongoDB backend; used by the readiness probe.
    pub db: Option<Database>,
    pub orders: OrderService,
    pub carts: CartService,
    pub rate_limiter: SharedRateLimiter,
}

impl AppState {
    /// Wire services over the given stores and gateway.
    pub fn from_parts(
        config: OrderConfig,
        db: Option<Database>,
        order_store: Arc<dyn OrderStore>,
        cart_store: Arc<dyn CartStore>,
        catalog: Arc<dyn ProductCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        rate_limiter: SharedRateLimiter,
    ) -> Self {
        let reconciler = Reconciler::new(cart_store.clone());
        let orders = OrderService::new(
            order_store,
            catalog,
            gateway,
            reconciler,
            config.checkout.clone(),
        );
        let carts = CartService::new(cart_store);

        Self {
            config: Arc::new(config),
            db,
            orders,
            carts,
            rate_limiter,
        }
    }
}

fn cors_layer(config: &OrderConfig) -> CorsLayer {
    let allow_origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("token"),
            HeaderName::from_static("x-admin-api-key"),
        ])
}

pub fn build_router(state: AppState) -> Router {
    // Storefront and admin routes share the per-IP limit; the webhook does not
    // so that gateway retries are never throttled.
    let api_routes = Router::new()
        .route("/api/order/place", post(handlers::orders::place_order))
        .route("/api/order/stripe", post(handlers::orders::place_order_stripe))
        .route("/api/order/list", post(handlers::orders::list_orders))
        .route("/api/order/userorders", post(handlers::orders::user_orders))
        .route("/api/order/status", post(handlers::orders::update_status))
        .route("/api/order/cancel", post(handlers::orders::cancel_order))
        .route("/api/cart/add", post(handlers::cart::add_to_cart))
        .route("/api/cart/update", post(handlers::cart::update_cart))
        .route("/api/cart/get", post(handlers::cart::get_cart))
        .layer(from_fn_with_state(
            state.rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/api/order/webhook", post(handlers::webhook::stripe_webhook))
        .merge(api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        // Outermost so the trace span sees the request id
        .layer(from_fn(request_id_middleware))
}

async fn connect_mongo(config: &OrderConfig) -> Result<Database, AppError> {
    let mut client_options = ClientOptions::parse(config.store.url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::DatabaseError(e.into())
        })?;
    client_options.app_name = Some(config.service_name.clone());

    let client = Client::with_options(client_options).map_err(|e| {
        tracing::error!("Failed to create MongoDB client: {}", e);
        AppError::DatabaseError(e.into())
    })?;
    Ok(client.database(&config.store.database))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: OrderConfig) -> Result<Self, AppError> {
        init_metrics();

        let (db, order_store, cart_store, catalog) = match config.store.backend {
            StoreBackend::Mongo => {
                let db = connect_mongo(&config).await?;
                let store = Arc::new(MongoStore::new(&db));
                store.init_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    AppError::DatabaseError(e)
                })?;
                let order_store: Arc<dyn OrderStore> = store.clone();
                let cart_store: Arc<dyn CartStore> = store.clone();
                let catalog: Arc<dyn ProductCatalog> = store;
                (Some(db), order_store, cart_store, catalog)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store - data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                let order_store: Arc<dyn OrderStore> = store.clone();
                let cart_store: Arc<dyn CartStore> = store.clone();
                let catalog: Arc<dyn ProductCatalog> = store;
                (None, order_store, cart_store, catalog)
            }
        };

        let stripe = StripeClient::new(config.stripe.clone()).map_err(AppError::ConfigError)?;
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!("Stripe credentials not configured - card checkout will fail");
        }

        let per_minute = config.rate_limit.per_minute;
        let rate_limiter: SharedRateLimiter = match config.rate_limit.backend {
            RateLimitBackend::Memory => Arc::new(GovernorRateLimit::new(per_minute, 60)),
            RateLimitBackend::Redis => {
                let client = redis::Client::open(config.redis.url.expose_secret().as_str())
                    .map_err(|e| {
                        tracing::error!("Failed to open Redis client: {}", e);
                        AppError::from(e)
                    })?;
                Arc::new(RedisRateLimit::new(client, per_minute, 60, "order-service"))
            }
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState::from_parts(
            config,
            db,
            order_store,
            cart_store,
            catalog,
            Arc::new(stripe),
            rate_limiter,
        );
        let router = build_router(state);

        // Port 0 binds a random port for tests.
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        tracing::info!(port = self.port, "Order service listening");

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

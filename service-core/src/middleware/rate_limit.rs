use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// Keyed rate limit backend, injected into the router instead of living in a global.
///
/// The in-process implementation suits a single instance; the Redis one shares
/// counters between instances.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check(&self, key: &str) -> Result<RateDecision, AppError>;
}

pub type SharedRateLimiter = Arc<dyn RateLimitStore>;

type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// In-process GCRA limiter keyed by client address.
pub struct GovernorRateLimit {
    limiter: KeyedLimiter,
}

impl GovernorRateLimit {
    pub fn new(attempts: u32, window_seconds: u64) -> Self {
        let burst = NonZeroU32::new(attempts.max(1)).unwrap_or(NonZeroU32::MIN);
        let period_ms = (window_seconds.max(1) * 1000) / u64::from(burst.get());
        let quota = Quota::with_period(Duration::from_millis(period_ms.max(1)))
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::dashmap(quota),
        }
    }
}

#[async_trait]
impl RateLimitStore for GovernorRateLimit {
    async fn check(&self, key: &str) -> Result<RateDecision, AppError> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(_) => Ok(RateDecision::Allowed),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                Ok(RateDecision::Limited {
                    retry_after_secs: wait_time.as_secs().max(1),
                })
            }
        }
    }
}

/// Fixed-window limiter backed by Redis. Each window key is created with its
/// expiry and incremented in one `MULTI`/`EXEC`, so a key never lives without a TTL.
pub struct RedisRateLimit {
    client: redis::Client,
    attempts: u32,
    window_seconds: u64,
    prefix: String,
}

impl RedisRateLimit {
    pub fn new(client: redis::Client, attempts: u32, window_seconds: u64, prefix: &str) -> Self {
        Self {
            client,
            attempts: attempts.max(1),
            window_seconds: window_seconds.max(1),
            prefix: prefix.to_string(),
        }
    }

    fn window_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimit {
    async fn check(&self, key: &str) -> Result<RateDecision, AppError> {
        let mut con = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!("Failed to get redis connection: {}", e);
                AppError::RedisError(e)
            })?;

        let key = self.window_key(key);
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(self.window_seconds)
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .query_async(&mut con)
            .await?;

        if count > u64::from(self.attempts) {
            let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut con).await?;
            return Ok(RateDecision::Limited {
                retry_after_secs: u64::try_from(ttl).unwrap_or(self.window_seconds).max(1),
            });
        }

        Ok(RateDecision::Allowed)
    }
}

fn client_key(request: &Request) -> Option<String> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    if let Some(ip) = forwarded_ip {
        return Some(ip.to_string());
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<SharedRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(key) = client_key(&request) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check(&key).await? {
        RateDecision::Allowed => Ok(next.run(request).await),
        RateDecision::Limited { retry_after_secs } => Err(AppError::TooManyRequests(
            "Too many requests from this IP. Please try again later.".to_string(),
            Some(retry_after_secs),
        )),
    }
}

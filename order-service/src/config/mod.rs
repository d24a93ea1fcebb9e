use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct OrderConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
    pub checkout: CheckoutConfig,
    pub rate_limit: RateLimitConfig,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
    pub admin_api_key: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub webhook_tolerance_secs: u64,
}

/// Pricing and lifecycle settings applied by the order service.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub currency: String,
    pub delivery_fee: f64,
    pub frontend_url: String,
    pub strict_transitions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackend,
    pub per_minute: u32,
}

impl OrderConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut common = core_config::Config::load()?;

        let environment: Environment = get_env("ENVIRONMENT", Some("dev"), false)?.parse()?;
        let is_prod = environment == Environment::Prod;

        common.port = parse_env("ORDER_SERVICE_PORT", common.port)?;
        if let Ok(level) = env::var("LOG_LEVEL") {
            common.log_level = level;
        }
        if common.otlp_endpoint.is_none() {
            common.otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        }

        let store_backend: StoreBackend =
            get_env("ORDER_STORE_BACKEND", Some("mongo"), false)?.parse()?;

        let frontend_url = get_env("FRONTEND_URL", Some("http://localhost:5173"), is_prod)?
            .trim_end_matches('/')
            .to_string();

        let config = OrderConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("order-service"), false)?,
            store: StoreConfig {
                backend: store_backend,
                url: Secret::new(if store_backend == StoreBackend::Mongo {
                    get_env("ORDER_DATABASE_URL", None, is_prod)?
                } else {
                    String::new()
                }),
                database: get_env("ORDER_DATABASE_NAME", Some("order_db"), false)?,
            },
            redis: RedisConfig {
                url: Secret::new(get_env(
                    "REDIS_URL",
                    Some("redis://localhost:6379"),
                    false,
                )?),
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(get_env("JWT_SECRET", None, true)?),
                admin_api_key: Secret::new(get_env("ADMIN_API_KEY", None, true)?),
            },
            stripe: StripeConfig {
                secret_key: Secret::new(get_env("STRIPE_SECRET_KEY", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env("STRIPE_WEBHOOK_SECRET", Some(""), is_prod)?),
                api_base_url: get_env(
                    "STRIPE_API_BASE_URL",
                    Some("https://api.stripe.com/v1"),
                    false,
                )?
                .trim_end_matches('/')
                .to_string(),
                timeout_secs: parse_env("STRIPE_TIMEOUT_SECS", 10)?,
                webhook_tolerance_secs: parse_env("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
            },
            checkout: CheckoutConfig {
                currency: get_env("CURRENCY", Some("usd"), false)?.to_lowercase(),
                delivery_fee: parse_env("DELIVERY_FEE", 10.0)?,
                frontend_url: frontend_url.clone(),
                strict_transitions: parse_env("ORDER_STRICT_TRANSITIONS", false)?,
            },
            rate_limit: RateLimitConfig {
                backend: get_env("RATE_LIMIT_BACKEND", Some("memory"), false)?.parse()?,
                per_minute: parse_env("RATE_LIMIT_PER_MINUTE", 120)?,
            },
            allowed_origins: get_env("ALLOWED_ORIGINS", Some(&frontend_url), false)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ORDER_SERVICE_PORT must be greater than 0"
            )));
        }

        if self.checkout.delivery_fee < 0.0 || !self.checkout.delivery_fee.is_finite() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DELIVERY_FEE must be a non-negative number"
            )));
        }

        if self.stripe.timeout_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STRIPE_TIMEOUT_SECS must be positive"
            )));
        }

        if self.rate_limit.per_minute == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_PER_MINUTE must be positive"
            )));
        }

        if self.auth.jwt_secret.expose_secret().is_empty()
            || self.auth.admin_api_key.expose_secret().is_empty()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET and ADMIN_API_KEY must not be empty"
            )));
        }

        if self.environment == Environment::Prod && self.allowed_origins.iter().any(|o| o == "*") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        if self.environment == Environment::Prod && self.store.backend == StoreBackend::Memory {
            tracing::error!("In-memory store selected in production - orders will not survive a restart");
        }

        if self.stripe.secret_key.expose_secret().is_empty() {
            tracing::warn!("STRIPE_SECRET_KEY not set - card checkout is disabled");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

impl FromStr for Environment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid environment: {}",
                s
            ))),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid store backend: {}",
                s
            ))),
        }
    }
}

impl FromStr for RateLimitBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(RateLimitBackend::Memory),
            "redis" => Ok(RateLimitBackend::Redis),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid rate limit backend: {}",
                s
            ))),
        }
    }
}

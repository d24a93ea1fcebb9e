//! Payment gateway boundary.
//!
//! The order state machine only sees these types; the processor-specific
//! client lives in [`crate::services::stripe`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use thiserror::Error;

use crate::models::PaymentDetails;

/// A priced line sent to the hosted checkout page.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub name: String,
    /// Smallest currency unit.
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Identifiers embedded in a session and echoed back in its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationMetadata {
    pub order_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub line_items: Vec<LineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CorrelationMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// A verified gateway notification, reduced to what the order core acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    PaymentSucceeded {
        event_id: String,
        correlation: Option<CorrelationMetadata>,
        details: PaymentDetails,
    },
    PaymentFailed {
        event_id: String,
        correlation: Option<CorrelationMetadata>,
        reason: String,
    },
    Ignored {
        event_id: String,
        event_type: String,
    },
}

impl GatewayEvent {
    pub fn event_id(&self) -> &str {
        match self {
            GatewayEvent::PaymentSucceeded { event_id, .. }
            | GatewayEvent::PaymentFailed { event_id, .. }
            | GatewayEvent::Ignored { event_id, .. } => event_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::PaymentSucceeded { .. } => "succeeded",
            GatewayEvent::PaymentFailed { .. } => "failed",
            GatewayEvent::Ignored { .. } => "ignored",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway credentials not configured")]
    NotConfigured,
    #[error("payment gateway request timed out")]
    Timeout,
    #[error("payment gateway unreachable: {0}")]
    Transport(String),
    #[error("payment gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the caller may try the same request again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Transport(_) => true,
            GatewayError::Rejected { status, .. } => *status == 429 || *status >= 500,
            GatewayError::NotConfigured | GatewayError::InvalidResponse(_) => false,
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::GatewayError {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("no signature matched the payload")]
    Mismatch,
    #[error("webhook secret not configured")]
    NotConfigured,
    #[error("signed payload is not a valid event: {0}")]
    Payload(String),
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Payload(msg) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload: {}", msg))
            }
            other => AppError::SignatureError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession, GatewayError>;

    /// Authenticate `raw_body` against `signature` and parse it. Nothing in the
    /// body is trusted before this returns `Ok`.
    fn verify_and_parse_event(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayEvent, SignatureError>;
}

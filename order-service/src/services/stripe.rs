//! Stripe payment provider client.
//!
//! Creates hosted Checkout Sessions for card orders and authenticates
//! webhook deliveries signed with the endpoint secret.

use crate::config::StripeConfig;
use crate::models::PaymentDetails;
use crate::services::gateway::{
    CheckoutSession, CorrelationMetadata, GatewayError, GatewayEvent, PaymentGateway,
    SessionRequest, SignatureError,
};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::utils::signature::verify_timestamped;
use std::collections::HashMap;
use std::time::Duration;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe client for interacting with the Stripe API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// Response from Checkout Session creation.
#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

/// Stripe API error response.
#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// Stripe webhook event envelope.
#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

/// The object is kept raw until the event type says it is one we act on.
#[derive(Debug, Deserialize)]
struct StripeEventData {
    #[serde(default)]
    object: serde_json::Value,
}

/// The subset of Checkout Session / PaymentIntent fields the order core reads.
/// Every field tolerates `null` or absence.
#[derive(Debug, Default, Deserialize)]
struct StripeObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    payment_method_types: Option<Vec<String>>,
    #[serde(default)]
    last_payment_error: Option<StripeErrorDetail>,
}

impl StripeObject {
    fn correlation(&self) -> Option<CorrelationMetadata> {
        let metadata = self.metadata.as_ref()?;
        let order_id = metadata.get("orderId")?.trim();
        let user_id = metadata.get("userId")?.trim();
        if order_id.is_empty() || user_id.is_empty() {
            return None;
        }
        Some(CorrelationMetadata {
            order_id: order_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    fn payment_details(&self, default_status: &str) -> PaymentDetails {
        PaymentDetails {
            payment_id: self
                .payment_intent
                .clone()
                .or_else(|| self.id.clone())
                .unwrap_or_default(),
            payment_status: self
                .payment_status
                .clone()
                .unwrap_or_else(|| default_status.to_string()),
            payment_method: self
                .payment_method_types
                .as_ref()
                .and_then(|types| types.first())
                .cloned()
                .unwrap_or_else(|| "card".to_string()),
        }
    }
}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                );
            }
            Some(("v1", value)) if !value.is_empty() => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::MalformedHeader),
    }
}

const HANDLED_EVENTS: [&str; 5] = [
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
    "checkout.session.async_payment_failed",
    "checkout.session.expired",
    "payment_intent.payment_failed",
];

/// Reduce a verified Stripe event to the order core's view of it.
///
/// Only the objects of handled event types are decoded. One that does not
/// decode loses its correlation and is acknowledged without effect.
fn classify_event(event: StripeEvent) -> GatewayEvent {
    if !HANDLED_EVENTS.contains(&event.event_type.as_str()) {
        return GatewayEvent::Ignored {
            event_id: event.id,
            event_type: event.event_type,
        };
    }

    let object: StripeObject = match serde_json::from_value(event.data.object) {
        Ok(object) => object,
        Err(e) => {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Unreadable object in verified event"
            );
            StripeObject::default()
        }
    };

    match event.event_type.as_str() {
        "checkout.session.completed" if object.payment_status.as_deref() == Some("paid") => {
            GatewayEvent::PaymentSucceeded {
                correlation: object.correlation(),
                details: object.payment_details("paid"),
                event_id: event.id,
            }
        }
        "checkout.session.async_payment_succeeded" => GatewayEvent::PaymentSucceeded {
            correlation: object.correlation(),
            details: object.payment_details("paid"),
            event_id: event.id,
        },
        "checkout.session.async_payment_failed"
        | "checkout.session.expired"
        | "payment_intent.payment_failed" => GatewayEvent::PaymentFailed {
            correlation: object.correlation(),
            reason: object
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| event.event_type.clone()),
            event_id: event.id,
        },
        _ => GatewayEvent::Ignored {
            event_id: event.id,
            event_type: event.event_type,
        },
    }
}

impl StripeClient {
    /// Create a new Stripe client with a bounded request timeout.
    pub fn new(config: StripeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Check if Stripe is configured (API key is set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Form body for `POST /v1/checkout/sessions`.
    fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                request.metadata.order_id.clone(),
            ),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            form.push((
                format!("{}[price_data][currency]", prefix),
                request.currency.clone(),
            ));
            form.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.name.clone(),
            ));
            form.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount.to_string(),
            ));
            form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        // Sent twice so both session and payment intent events carry it.
        for scope in ["metadata", "payment_intent_data[metadata]"] {
            form.push((
                format!("{}[orderId]", scope),
                request.metadata.order_id.clone(),
            ));
            form.push((
                format!("{}[userId]", scope),
                request.metadata.user_id.clone(),
            ));
        }

        form
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!("{}/checkout/sessions", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&Self::session_form(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        tracing::debug!(status = %status, "Stripe create_session response");

        if status.is_success() {
            let session: StripeSession = serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            tracing::info!(
                session_id = %session.id,
                order_id = %request.metadata.order_id,
                "Stripe checkout session created"
            );
            Ok(CheckoutSession {
                id: session.id,
                url: session.url,
            })
        } else {
            let message = serde_json::from_str::<StripeError>(&body)
                .ok()
                .and_then(|e| {
                    let kind = e.error.error_type.unwrap_or_default();
                    e.error.message.map(|m| format!("{} {}", kind, m).trim().to_string())
                })
                .unwrap_or(body);
            tracing::error!(
                status = status.as_u16(),
                description = %message,
                "Stripe checkout session creation failed"
            );
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn verify_and_parse_event(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayEvent, SignatureError> {
        let secret = self.config.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(SignatureError::NotConfigured);
        }

        let header = parse_signature_header(signature.ok_or(SignatureError::MissingHeader)?)?;

        let age = chrono::Utc::now().timestamp() - header.timestamp;
        if age.unsigned_abs() > self.config.webhook_tolerance_secs {
            return Err(SignatureError::StaleTimestamp);
        }

        let mut matched = false;
        for candidate in &header.signatures {
            if verify_timestamped(secret, header.timestamp, raw_body, candidate)
                .map_err(|_| SignatureError::NotConfigured)?
            {
                matched = true;
            }
        }
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        let event: StripeEvent = serde_json::from_slice(raw_body)
            .map_err(|e| SignatureError::Payload(e.to_string()))?;

        Ok(classify_event(event))
    }
}

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use service_core::error::AppError;

use crate::dtos::WebhookAck;
use crate::services::stripe::SIGNATURE_HEADER;
use crate::startup::AppState;

/// Receive a Stripe event.
///
/// POST /api/order/webhook
///
/// The raw body is passed through untouched; the signature covers its exact
/// bytes. Verified events are always acknowledged, even when they change
/// nothing, so Stripe stops redelivering them.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.orders.apply_gateway_event(&body, signature).await?;
    tracing::debug!(outcome = outcome.as_str(), "Stripe webhook processed");

    Ok(Json(WebhookAck {
        success: true,
        received: true,
    }))
}

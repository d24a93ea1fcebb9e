use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::{
    CancelOrderRequest, CheckoutResponse, OrderEnvelope, OrdersEnvelope, PlaceOrderRequest,
    UpdateStatusRequest, UserScopedRequest,
};
use crate::middleware::{AdminUser, AuthUser};
use crate::models::Actor;
use crate::services::PlaceOrderInput;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

fn placement(user: &AuthUser, req: PlaceOrderRequest) -> Result<PlaceOrderInput, AppError> {
    user.ensure_matches(req.user_id.as_deref())?;
    Ok(PlaceOrderInput {
        user_id: user.user_id.clone(),
        items: req.items,
        amount: req.amount,
        address: req.address,
    })
}

/// Place a cash-on-delivery order.
///
/// POST /api/order/place
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<PlaceOrderRequest>,
) -> Result<Json<OrderEnvelope>, AppError> {
    let order = state.orders.place_order_cod(placement(&user, req)?).await?;
    Ok(Json(order.into()))
}

/// Create a pending card order and its hosted checkout session.
///
/// POST /api/order/stripe
pub async fn place_order_stripe(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<PlaceOrderRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let pending = state
        .orders
        .create_pending_card_order(placement(&user, req)?)
        .await?;

    Ok(Json(CheckoutResponse {
        success: true,
        session_id: pending.session.id,
        session_url: pending.session.url,
        order_id: pending.order.id,
    }))
}

/// All orders, newest first.
///
/// POST /api/order/list
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<OrdersEnvelope>, AppError> {
    let orders = state.orders.list_orders().await?;
    Ok(Json(orders.into()))
}

/// The caller's orders, newest first.
///
/// POST /api/order/userorders
pub async fn user_orders(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<Json<UserScopedRequest>>,
) -> Result<Json<OrdersEnvelope>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    user.ensure_matches(req.user_id.as_deref())?;

    let orders = state.orders.user_orders(&user.user_id).await?;
    Ok(Json(orders.into()))
}

/// POST /api/order/status
pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<OrderEnvelope>, AppError> {
    let order = state
        .orders
        .update_status(&req.order_id, &req.status, Actor::Admin)
        .await?;
    Ok(Json(order.into()))
}

/// Cancel one of the caller's own orders.
///
/// POST /api/order/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CancelOrderRequest>,
) -> Result<Json<OrderEnvelope>, AppError> {
    user.ensure_matches(req.user_id.as_deref())?;

    let order = state
        .orders
        .cancel_order(&req.order_id, Actor::User(user.user_id.clone()))
        .await?;
    Ok(Json(order.into()))
}

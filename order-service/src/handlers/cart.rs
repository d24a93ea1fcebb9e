use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::{
    AddToCartRequest, CartQuantityResponse, CartResponse, SuccessResponse, UpdateCartRequest,
    UserScopedRequest,
};
use crate::middleware::AuthUser;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Add one unit of an item/size to the caller's cart.
///
/// POST /api/cart/add
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<AddToCartRequest>,
) -> Result<Json<CartQuantityResponse>, AppError> {
    user.ensure_matches(req.user_id.as_deref())?;

    let quantity = state
        .carts
        .add_to_cart(&user.user_id, &req.item_id, &req.size)
        .await?;

    Ok(Json(CartQuantityResponse {
        success: true,
        quantity,
    }))
}

/// Set the quantity of one cart line; zero removes it.
///
/// POST /api/cart/update
pub async fn update_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateCartRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    user.ensure_matches(req.user_id.as_deref())?;

    state
        .carts
        .update_cart(&user.user_id, &req.item_id, &req.size, req.quantity)
        .await?;

    Ok(Json(SuccessResponse {
        success: true,
        message: "Cart Updated".to_string(),
    }))
}

/// POST /api/cart/get
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<Json<UserScopedRequest>>,
) -> Result<Json<CartResponse>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    user.ensure_matches(req.user_id.as_deref())?;

    let cart_data = state.carts.get_cart(&user.user_id).await?;

    Ok(Json(CartResponse {
        success: true,
        cart_data,
    }))
}

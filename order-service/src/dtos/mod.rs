use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    Address, CancelledBy, CartData, Order, OrderItem, OrderStatus, PaymentDetails, PaymentMethod,
    RequestedItem,
};

// ============================================================================
// Requests
// ============================================================================

/// Body of `/api/order/place` and `/api/order/stripe`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one item"), nested)]
    pub items: Vec<RequestedItem>,
    pub amount: f64,
    #[validate(nested)]
    pub address: Address,
}

/// Body of endpoints that only identify the caller.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScopedRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, message = "orderId is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[validate(length(min = 1, message = "orderId is required"))]
    pub order_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub item_id: String,
    #[validate(length(min = 1, max = 32))]
    pub size: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub item_id: String,
    #[validate(length(min = 1, max = 32))]
    pub size: String,
    #[validate(range(max = 1000))]
    pub quantity: u32,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub amount: f64,
    pub currency: String,
    pub address: Address,
    pub payment_method: PaymentMethod,
    pub payment: bool,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<CancelledBy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            items: order.items,
            amount: order.amount,
            currency: order.currency,
            address: order.address,
            payment_method: order.payment_method,
            payment: order.payment,
            status: order.status,
            payment_details: order.payment_details,
            cancelled_by: order.cancelled_by,
            created_at: order.created_at.to_chrono(),
            updated_at: order.updated_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderEnvelope {
    pub success: bool,
    pub order: OrderResponse,
}

impl From<Order> for OrderEnvelope {
    fn from(order: Order) -> Self {
        Self {
            success: true,
            order: order.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrdersEnvelope {
    pub success: bool,
    pub orders: Vec<OrderResponse>,
}

impl From<Vec<Order>> for OrdersEnvelope {
    fn from(orders: Vec<Order>) -> Self {
        Self {
            success: true,
            orders: orders.into_iter().map(OrderResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub session_id: String,
    pub session_url: Option<String>,
    pub order_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    pub received: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CartQuantityResponse {
    pub success: bool,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub success: bool,
    pub cart_data: CartData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

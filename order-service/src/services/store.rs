//! Persistence seams.
//!
//! Every mutation is a conditional update keyed by document id so handlers
//! running on independent instances never need in-process locks.

use async_trait::async_trait;
use service_core::error::AppError;

use crate::models::{Cart, CancelledBy, Order, OrderStatus, PaymentDetails, Product};

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), AppError>;

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, AppError>;

    /// All orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>, AppError>;

    /// Orders owned by one user, newest first.
    async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>, AppError>;

    /// Record the checkout session of a still-pending card order.
    async fn attach_gateway_session(&self, order_id: &str, session_id: &str)
        -> Result<(), AppError>;

    /// Set `payment = true`, `status = Order Placed` and the payment details,
    /// only if the order is unpaid and awaiting payment. Returns the updated
    /// order, or `None` when nothing changed.
    async fn confirm_payment(
        &self,
        order_id: &str,
        details: &PaymentDetails,
    ) -> Result<Option<Order>, AppError>;

    /// Set `status = Payment Failed`, only if the order is unpaid and pending.
    /// Returns whether the order changed.
    async fn mark_payment_failed(&self, order_id: &str) -> Result<bool, AppError>;

    /// Move an order from `expected` to `next`. Returns the updated order, or
    /// `None` when the order is missing or no longer in `expected`.
    async fn transition_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        cancelled_by: Option<CancelledBy>,
    ) -> Result<Option<Order>, AppError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Atomically add one unit of `(item_id, size)`, creating the cart if
    /// needed. Returns the new quantity.
    async fn increment_item(&self, user_id: &str, item_id: &str, size: &str)
        -> Result<u32, AppError>;

    /// Targeted set of one line; quantity 0 removes it. Returns `false` when
    /// the user has no cart.
    async fn set_item_quantity(
        &self,
        user_id: &str,
        item_id: &str,
        size: &str,
        quantity: u32,
    ) -> Result<bool, AppError>;

    async fn find_cart(&self, user_id: &str) -> Result<Option<Cart>, AppError>;

    /// Delete-if-exists. Returns whether a cart was removed.
    async fn delete_cart(&self, user_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Products matching `ids`; unknown ids are simply absent from the result.
    async fn find_products(&self, ids: &[String]) -> Result<Vec<Product>, AppError>;
}

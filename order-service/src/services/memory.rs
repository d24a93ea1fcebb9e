//! In-process store used for local runs and tests.
//!
//! Each conditional update runs under the entry's shard lock, giving the same
//! compare-and-set semantics as the MongoDB filters.

use crate::models::{CancelledBy, Cart, Order, OrderStatus, PaymentDetails, Product};
use crate::services::store::{CartStore, OrderStore, ProductCatalog};
use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryStore {
    orders: Arc<DashMap<String, Order>>,
    carts: Arc<DashMap<String, Cart>>,
    products: Arc<DashMap<String, Product>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        if self.orders.contains_key(&order.id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} already exists",
                order.id
            )));
        }
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(order_id).map(|o| o.clone()))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        let orders = self.orders.iter().map(|o| o.clone()).collect();
        Ok(Self::newest_first(orders))
    }

    async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>, AppError> {
        let orders = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.clone())
            .collect();
        Ok(Self::newest_first(orders))
    }

    async fn attach_gateway_session(&self, order_id: &str, session_id: &str) -> Result<(), AppError> {
        if let Some(mut order) = self.orders.get_mut(order_id) {
            order.gateway_session_id = Some(session_id.to_string());
            order.updated_at = DateTime::now();
        }
        Ok(())
    }

    async fn confirm_payment(
        &self,
        order_id: &str,
        details: &PaymentDetails,
    ) -> Result<Option<Order>, AppError> {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Ok(None);
        };
        if order.payment || !order.status.awaits_payment() {
            return Ok(None);
        }

        order.payment = true;
        order.status = OrderStatus::Placed;
        order.payment_details = Some(details.clone());
        order.updated_at = DateTime::now();
        Ok(Some(order.clone()))
    }

    async fn mark_payment_failed(&self, order_id: &str) -> Result<bool, AppError> {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Ok(false);
        };
        if order.payment || order.status != OrderStatus::Pending {
            return Ok(false);
        }

        order.status = OrderStatus::PaymentFailed;
        order.updated_at = DateTime::now();
        Ok(true)
    }

    async fn transition_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        cancelled_by: Option<CancelledBy>,
    ) -> Result<Option<Order>, AppError> {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Ok(None);
        };
        if order.status != expected {
            return Ok(None);
        }

        order.status = next;
        if cancelled_by.is_some() {
            order.cancelled_by = cancelled_by;
        }
        order.updated_at = DateTime::now();
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn increment_item(&self, user_id: &str, item_id: &str, size: &str) -> Result<u32, AppError> {
        let mut cart = self
            .carts
            .entry(user_id.to_string())
            .or_insert_with(|| Cart::new(user_id));

        let qty = cart
            .items
            .entry(item_id.to_string())
            .or_default()
            .entry(size.to_string())
            .or_insert(0);
        *qty += 1;
        let qty = *qty;

        cart.version += 1;
        cart.updated_at = DateTime::now();
        Ok(qty)
    }

    async fn set_item_quantity(
        &self,
        user_id: &str,
        item_id: &str,
        size: &str,
        quantity: u32,
    ) -> Result<bool, AppError> {
        let Some(mut cart) = self.carts.get_mut(user_id) else {
            return Ok(false);
        };

        if quantity == 0 {
            if let Some(sizes) = cart.items.get_mut(item_id) {
                sizes.remove(size);
            }
        } else {
            cart.items
                .entry(item_id.to_string())
                .or_default()
                .insert(size.to_string(), quantity);
        }

        cart.version += 1;
        cart.updated_at = DateTime::now();
        Ok(true)
    }

    async fn find_cart(&self, user_id: &str) -> Result<Option<Cart>, AppError> {
        Ok(self.carts.get(user_id).map(|c| c.clone()))
    }

    async fn delete_cart(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self.carts.remove(user_id).is_some())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn find_products(&self, ids: &[String]) -> Result<Vec<Product>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|p| p.clone()))
            .collect())
    }
}

use crate::models::{validate_cart_key, CartData};
use crate::services::store::CartStore;
use service_core::error::AppError;
use std::sync::Arc;

/// Per-user cart operations. Every write is a single targeted update so
/// concurrent adds from several tabs or instances never overwrite each other.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
}

impl CartService {
    pub fn new(store: Arc<dyn CartStore>) -> Self {
        Self { store }
    }

    pub async fn add_to_cart(&self, user_id: &str, item_id: &str, size: &str) -> Result<u32, AppError> {
        validate_cart_key(item_id, "itemId")?;
        validate_cart_key(size, "size")?;

        let quantity = self.store.increment_item(user_id, item_id, size).await?;
        tracing::debug!(user_id = %user_id, item_id = %item_id, size = %size, quantity, "Cart item added");
        Ok(quantity)
    }

    pub async fn update_cart(
        &self,
        user_id: &str,
        item_id: &str,
        size: &str,
        quantity: u32,
    ) -> Result<(), AppError> {
        validate_cart_key(item_id, "itemId")?;
        validate_cart_key(size, "size")?;

        if !self
            .store
            .set_item_quantity(user_id, item_id, size, quantity)
            .await?
        {
            return Err(AppError::NotFound(anyhow::anyhow!("Cart not found")));
        }
        Ok(())
    }

    pub async fn get_cart(&self, user_id: &str) -> Result<CartData, AppError> {
        Ok(self
            .store
            .find_cart(user_id)
            .await?
            .map(|cart| cart.into_data())
            .unwrap_or_default())
    }
}

use crate::services::store::CartStore;
use service_core::error::AppError;
use std::sync::Arc;

/// Post-placement cleanup shared by the COD path and gateway confirmation.
#[derive(Clone)]
pub struct Reconciler {
    carts: Arc<dyn CartStore>,
}

impl Reconciler {
    pub fn new(carts: Arc<dyn CartStore>) -> Self {
        Self { carts }
    }

    /// Delete the user's cart if it still exists. Safe to repeat.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: &str) -> Result<bool, AppError> {
        let removed = self.carts.delete_cart(user_id).await?;
        if removed {
            tracing::info!(user_id = %user_id, "Cart cleared after order placement");
        } else {
            tracing::debug!(user_id = %user_id, "No cart to clear");
        }
        Ok(removed)
    }
}

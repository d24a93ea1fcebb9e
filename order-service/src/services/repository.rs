use crate::models::{
    cart_item_path, CancelledBy, Cart, Order, OrderStatus, PaymentDetails, Product,
};
use crate::services::store::{CartStore, OrderStore, ProductCatalog};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{
    bson::{doc, DateTime},
    Collection, Database, IndexModel,
};
use service_core::error::AppError;

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed order, cart and catalog persistence.
#[derive(Clone)]
pub struct MongoStore {
    order_collection: Collection<Order>,
    cart_collection: Collection<Cart>,
    product_collection: Collection<Product>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            order_collection: db.collection("orders"),
            cart_collection: db.collection("carts"),
            product_collection: db.collection("products"),
        }
    }

    /// Initialize indexes for user order history and session lookups.
    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        let user_orders_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_orders_idx".to_string())
                    .build(),
            )
            .build();

        let session_index = IndexModel::builder()
            .keys(doc! { "gateway_session_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("gateway_session_idx".to_string())
                    .sparse(true)
                    .build(),
            )
            .build();

        self.order_collection
            .create_indexes([user_orders_index, session_index], None)
            .await?;

        tracing::info!("Order service indexes initialized");
        Ok(())
    }

    async fn find_sorted(&self, filter: mongodb::bson::Document) -> Result<Vec<Order>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.order_collection.find(filter, options).await?;
        let orders: Vec<Order> = cursor.try_collect().await?;
        Ok(orders)
    }

    async fn upsert_increment(&self, user_id: &str, path: &str) -> mongodb::error::Result<Option<Cart>> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        self.cart_collection
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { path: 1, "version": 1_i64 },
                    "$set": { "updated_at": DateTime::now() }
                },
                options,
            )
            .await
    }
}

/// Two concurrent upserts on a missing `_id` can both try to insert; the
/// loser sees a duplicate key error and succeeds as a plain update on retry.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[async_trait]
impl OrderStore for MongoStore {
    async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        self.order_collection.insert_one(order, None).await?;
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, AppError> {
        let order = self
            .order_collection
            .find_one(doc! { "_id": order_id }, None)
            .await?;
        Ok(order)
    }

    async fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        self.find_sorted(doc! {}).await
    }

    async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>, AppError> {
        self.find_sorted(doc! { "user_id": user_id }).await
    }

    async fn attach_gateway_session(&self, order_id: &str, session_id: &str) -> Result<(), AppError> {
        self.order_collection
            .update_one(
                doc! { "_id": order_id },
                doc! {
                    "$set": {
                        "gateway_session_id": session_id,
                        "updated_at": DateTime::now()
                    }
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn confirm_payment(
        &self,
        order_id: &str,
        details: &PaymentDetails,
    ) -> Result<Option<Order>, AppError> {
        let filter = doc! {
            "_id": order_id,
            "payment": false,
            "status": {
                "$in": [OrderStatus::Pending.as_str(), OrderStatus::PaymentFailed.as_str()]
            }
        };
        let update = doc! {
            "$set": {
                "payment": true,
                "status": OrderStatus::Placed.as_str(),
                "payment_details": mongodb::bson::to_bson(details)?,
                "updated_at": DateTime::now()
            }
        };

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let order = self
            .order_collection
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(order)
    }

    async fn mark_payment_failed(&self, order_id: &str) -> Result<bool, AppError> {
        let filter = doc! {
            "_id": order_id,
            "payment": false,
            "status": OrderStatus::Pending.as_str()
        };
        let update = doc! {
            "$set": {
                "status": OrderStatus::PaymentFailed.as_str(),
                "updated_at": DateTime::now()
            }
        };

        let result = self
            .order_collection
            .update_one(filter, update, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn transition_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        cancelled_by: Option<CancelledBy>,
    ) -> Result<Option<Order>, AppError> {
        let mut set = doc! {
            "status": next.as_str(),
            "updated_at": DateTime::now()
        };
        if let Some(by) = cancelled_by {
            set.insert("cancelled_by", mongodb::bson::to_bson(&by)?);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let order = self
            .order_collection
            .find_one_and_update(
                doc! { "_id": order_id, "status": expected.as_str() },
                doc! { "$set": set },
                options,
            )
            .await?;
        Ok(order)
    }
}

#[async_trait]
impl CartStore for MongoStore {
    async fn increment_item(&self, user_id: &str, item_id: &str, size: &str) -> Result<u32, AppError> {
        let path = cart_item_path(item_id, size);

        let cart = match self.upsert_increment(user_id, &path).await {
            Ok(cart) => cart,
            Err(err) if is_duplicate_key(&err) => {
                tracing::debug!(user_id = %user_id, "Concurrent cart creation, retrying increment");
                self.upsert_increment(user_id, &path).await?
            }
            Err(err) => return Err(err.into()),
        };

        let cart = cart.ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("Cart upsert returned no document"))
        })?;
        Ok(cart.quantity(item_id, size))
    }

    async fn set_item_quantity(
        &self,
        user_id: &str,
        item_id: &str,
        size: &str,
        quantity: u32,
    ) -> Result<bool, AppError> {
        let path = cart_item_path(item_id, size);
        let now = DateTime::now();

        let update = if quantity == 0 {
            doc! {
                "$unset": { path: "" },
                "$inc": { "version": 1_i64 },
                "$set": { "updated_at": now }
            }
        } else {
            doc! {
                "$set": { path: i64::from(quantity), "updated_at": now },
                "$inc": { "version": 1_i64 }
            }
        };

        let result = self
            .cart_collection
            .update_one(doc! { "_id": user_id }, update, None)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn find_cart(&self, user_id: &str) -> Result<Option<Cart>, AppError> {
        let cart = self
            .cart_collection
            .find_one(doc! { "_id": user_id }, None)
            .await?;
        Ok(cart)
    }

    async fn delete_cart(&self, user_id: &str) -> Result<bool, AppError> {
        let result = self
            .cart_collection
            .delete_one(doc! { "_id": user_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }
}

#[async_trait]
impl ProductCatalog for MongoStore {
    async fn find_products(&self, ids: &[String]) -> Result<Vec<Product>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .product_collection
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await?;
        let products: Vec<Product> = cursor.try_collect().await?;
        Ok(products)
    }
}

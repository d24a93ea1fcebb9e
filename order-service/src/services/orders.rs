use crate::config::CheckoutConfig;
use crate::models::{
    to_minor_units, Actor, Address, Order, OrderItem, OrderStatus, PaymentMethod,
    RequestedItem,
};
use crate::services::gateway::{
    CheckoutSession, CorrelationMetadata, GatewayEvent, LineItem, PaymentGateway, SessionRequest,
};
use crate::services::metrics;
use crate::services::reconciliation::Reconciler;
use crate::services::store::{OrderStore, ProductCatalog};
use service_core::error::AppError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use validator::Validate;

/// A placement request after authentication. Prices are looked up, never
/// taken from here; `amount` is only checked against the computed total.
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub user_id: String,
    pub items: Vec<RequestedItem>,
    pub amount: f64,
    pub address: Address,
}

/// A card order waiting on the hosted checkout page.
#[derive(Debug, Clone)]
pub struct PendingCheckout {
    pub order: Order,
    pub session: CheckoutSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event changed an order.
    Applied,
    /// The order was already past the state this event moves it out of.
    AlreadyApplied,
    /// Nothing in the event concerns order state.
    Ignored,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::AlreadyApplied => "already_applied",
            EventOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn ProductCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Reconciler,
    settings: CheckoutConfig,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn ProductCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Reconciler,
        settings: CheckoutConfig,
    ) -> Self {
        Self {
            orders,
            catalog,
            gateway,
            reconciler,
            settings,
        }
    }

    /// Price the requested lines from the catalog.
    async fn price_items(&self, items: &[RequestedItem]) -> Result<Vec<OrderItem>, AppError> {
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order must contain at least one item"
            )));
        }
        for item in items {
            item.validate()?;
        }

        let ids: Vec<String> = items
            .iter()
            .map(|i| i.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products: HashMap<String, _> = self
            .catalog
            .find_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        items
            .iter()
            .map(|item| -> Result<OrderItem, AppError> {
                let product = products.get(&item.product_id).ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Product {} not found", item.product_id))
                })?;
                if !product.offers_size(&item.size) {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Size {} is not available for {}",
                        item.size,
                        product.name
                    )));
                }
                Ok(OrderItem {
                    product_id: product.id.clone(),
                    name: product.name.clone(),
                    size: item.size.clone(),
                    quantity: item.quantity,
                    price_at_order_time: product.price,
                })
            })
            .collect()
    }

    /// Validate, price and total a placement request.
    async fn prepare(&self, input: &PlaceOrderInput) -> Result<(Vec<OrderItem>, f64), AppError> {
        input.address.validate()?;

        let items = self.price_items(&input.items).await?;
        let total = items.iter().map(OrderItem::line_total).sum::<f64>() + self.settings.delivery_fee;

        if !input.amount.is_finite() || to_minor_units(input.amount) != to_minor_units(total) {
            tracing::warn!(
                user_id = %input.user_id,
                client_amount = input.amount,
                computed_amount = total,
                "Order amount mismatch"
            );
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order amount does not match current prices"
            )));
        }

        Ok((items, total))
    }

    async fn reconcile(&self, user_id: &str, order_id: &str) {
        if let Err(e) = self.reconciler.clear_cart(user_id).await {
            tracing::error!(
                error = %e,
                user_id = %user_id,
                order_id = %order_id,
                "Failed to clear cart after order placement"
            );
        }
    }

    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn place_order_cod(&self, input: PlaceOrderInput) -> Result<Order, AppError> {
        let (items, total) = self.prepare(&input).await?;

        let order = Order::new(
            input.user_id,
            items,
            total,
            self.settings.currency.clone(),
            input.address,
            PaymentMethod::Cod,
        );
        self.orders.insert_order(&order).await?;

        metrics::record_order_placed(
            PaymentMethod::Cod.as_str(),
            &order.currency,
            to_minor_units(order.amount),
        );
        tracing::info!(order_id = %order.id, amount = order.amount, "COD order placed");

        self.reconcile(&order.user_id, &order.id).await;
        Ok(order)
    }

    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_pending_card_order(
        &self,
        input: PlaceOrderInput,
    ) -> Result<PendingCheckout, AppError> {
        let (items, total) = self.prepare(&input).await?;

        let mut order = Order::new(
            input.user_id,
            items,
            total,
            self.settings.currency.clone(),
            input.address,
            PaymentMethod::Card,
        );
        self.orders.insert_order(&order).await?;

        let mut line_items: Vec<LineItem> = order
            .items
            .iter()
            .map(|item| LineItem {
                name: item.name.clone(),
                unit_amount: to_minor_units(item.price_at_order_time),
                quantity: item.quantity,
            })
            .collect();
        if self.settings.delivery_fee > 0.0 {
            line_items.push(LineItem {
                name: "Delivery Charges".to_string(),
                unit_amount: to_minor_units(self.settings.delivery_fee),
                quantity: 1,
            });
        }

        let request = SessionRequest {
            line_items,
            currency: order.currency.clone(),
            success_url: format!(
                "{}/verify?success=true&orderId={}",
                self.settings.frontend_url, order.id
            ),
            cancel_url: format!(
                "{}/verify?success=false&orderId={}",
                self.settings.frontend_url, order.id
            ),
            metadata: CorrelationMetadata {
                order_id: order.id.clone(),
                user_id: order.user_id.clone(),
            },
        };

        let session = match self.gateway.create_session(request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Checkout session creation failed");
                if let Err(mark_err) = self.orders.mark_payment_failed(&order.id).await {
                    tracing::error!(
                        order_id = %order.id,
                        error = %mark_err,
                        "Failed to mark order as payment failed"
                    );
                }
                return Err(e.into());
            }
        };

        self.orders
            .attach_gateway_session(&order.id, &session.id)
            .await?;
        order.gateway_session_id = Some(session.id.clone());

        tracing::info!(order_id = %order.id, session_id = %session.id, "Card order pending payment");

        Ok(PendingCheckout { order, session })
    }

    /// Verify and apply one gateway notification. Nothing is read or written
    /// before the signature checks out.
    pub async fn apply_gateway_event(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<EventOutcome, AppError> {
        let event = match self.gateway.verify_and_parse_event(raw_body, signature) {
            Ok(event) => event,
            Err(e) => {
                metrics::record_gateway_event("unverified", "rejected");
                return Err(e.into());
            }
        };

        let kind = event.kind();
        let event_id = event.event_id().to_string();

        let outcome = match event {
            GatewayEvent::PaymentSucceeded {
                correlation: Some(correlation),
                details,
                ..
            } => {
                match self
                    .orders
                    .confirm_payment(&correlation.order_id, &details)
                    .await?
                {
                    Some(order) => {
                        tracing::info!(
                            event_id = %event_id,
                            order_id = %order.id,
                            payment_id = %details.payment_id,
                            "Payment confirmed"
                        );
                        metrics::record_order_placed(
                            PaymentMethod::Card.as_str(),
                            &order.currency,
                            to_minor_units(order.amount),
                        );
                        self.reconcile(&order.user_id, &order.id).await;
                        EventOutcome::Applied
                    }
                    None => {
                        self.report_unconfirmed(&event_id, &correlation.order_id).await;
                        EventOutcome::AlreadyApplied
                    }
                }
            }
            GatewayEvent::PaymentFailed {
                correlation: Some(correlation),
                reason,
                ..
            } => {
                if self.orders.mark_payment_failed(&correlation.order_id).await? {
                    tracing::info!(
                        event_id = %event_id,
                        order_id = %correlation.order_id,
                        reason = %reason,
                        "Payment failed"
                    );
                    EventOutcome::Applied
                } else {
                    tracing::debug!(
                        event_id = %event_id,
                        order_id = %correlation.order_id,
                        "Payment failure ignored for order no longer pending"
                    );
                    EventOutcome::AlreadyApplied
                }
            }
            GatewayEvent::PaymentSucceeded {
                correlation: None, ..
            }
            | GatewayEvent::PaymentFailed {
                correlation: None, ..
            } => {
                tracing::warn!(event_id = %event_id, kind, "Verified event without order metadata");
                EventOutcome::Ignored
            }
            GatewayEvent::Ignored { event_type, .. } => {
                tracing::debug!(event_id = %event_id, event_type = %event_type, "Unhandled event type");
                EventOutcome::Ignored
            }
        };

        metrics::record_gateway_event(kind, outcome.as_str());
        Ok(outcome)
    }

    /// A paid event that changed nothing is only a redelivery when the order
    /// is already paid. Anything else means money was taken for an order that
    /// left the payment states some other way.
    async fn report_unconfirmed(&self, event_id: &str, order_id: &str) {
        match self.orders.find_order(order_id).await {
            Ok(Some(order)) if order.payment => {
                tracing::debug!(
                    event_id = %event_id,
                    order_id = %order_id,
                    "Payment confirmation already applied"
                );
            }
            Ok(Some(order)) => {
                tracing::warn!(
                    event_id = %event_id,
                    order_id = %order_id,
                    status = %order.status,
                    "Paid event for an order no longer awaiting payment"
                );
                metrics::record_unconfirmed_payment(order.status.as_str());
            }
            Ok(None) => {
                tracing::warn!(
                    event_id = %event_id,
                    order_id = %order_id,
                    "Paid event for an unknown order"
                );
                metrics::record_unconfirmed_payment("missing");
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    order_id = %order_id,
                    error = %e,
                    "Could not load order for unapplied payment confirmation"
                );
            }
        }
    }

    /// Administrative status change.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: &str,
        status: &str,
        actor: Actor,
    ) -> Result<Order, AppError> {
        let next: OrderStatus = status.parse()?;

        let current = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        if current.status == next {
            return Ok(current);
        }

        // Only gateway confirmation moves an order out of the payment states.
        if current.status.awaits_payment() && next != OrderStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order is awaiting payment; status {} cannot be set manually",
                next
            )));
        }

        if !current.status.can_transition_to(next) {
            if self.settings.strict_transitions {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Cannot change order status from {} to {}",
                    current.status,
                    next
                )));
            }
            tracing::warn!(
                order_id = %order_id,
                from = %current.status,
                to = %next,
                "Status change outside the order lifecycle"
            );
            metrics::record_out_of_band_transition(current.status.as_str(), next.as_str());
        }

        let cancelled_by = (next == OrderStatus::Cancelled).then(|| actor.cancelled_by());

        let updated = self
            .orders
            .transition_status(order_id, current.status, next, cancelled_by)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!("Order was modified concurrently, retry"))
            })?;

        tracing::info!(order_id = %order_id, from = %current.status, to = %next, "Order status updated");
        Ok(updated)
    }

    /// Cancellation, allowed only where the lifecycle permits it. A user may
    /// only cancel their own orders; other orders read as not found.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str, actor: Actor) -> Result<Order, AppError> {
        let current = self
            .orders
            .find_order(order_id)
            .await?
            .filter(|o| actor.may_act_on(o))
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        if !current.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order can no longer be cancelled ({})",
                current.status
            )));
        }

        let updated = self
            .orders
            .transition_status(
                order_id,
                current.status,
                OrderStatus::Cancelled,
                Some(actor.cancelled_by()),
            )
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!("Order was modified concurrently, retry"))
            })?;

        tracing::info!(order_id = %order_id, cancelled_by = ?actor.cancelled_by(), "Order cancelled");
        Ok(updated)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        self.orders.list_orders().await
    }

    pub async fn user_orders(&self, user_id: &str) -> Result<Vec<Order>, AppError> {
        self.orders.list_user_orders(user_id).await
    }
}

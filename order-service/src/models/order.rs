use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Lifecycle of an order.
///
/// The serialized literals are an external contract: clients and stored
/// documents match on them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Order Placed")]
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Pending,
    #[serde(rename = "Payment Failed")]
    PaymentFailed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Placed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Pending,
        OrderStatus::PaymentFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "Order Placed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Pending => "Pending",
            OrderStatus::PaymentFailed => "Payment Failed",
        }
    }

    /// Whether `next` is an edge of the forward-only order graph.
    ///
    /// `Pending` and `Payment Failed` only leave through gateway confirmation,
    /// so no administrative edge starts there.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Placed, Processing)
                | (Placed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// States a gateway "payment succeeded" event may confirm.
    pub fn awaits_payment(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PaymentFailed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    Cod,
    #[serde(rename = "CARD")]
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Card => "CARD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    User,
    Admin,
}

/// Who is asking for a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(String),
    Admin,
}

impl Actor {
    pub fn cancelled_by(&self) -> CancelledBy {
        match self {
            Actor::User(_) => CancelledBy::User,
            Actor::Admin => CancelledBy::Admin,
        }
    }

    /// Admins act on any order, users only on their own.
    pub fn may_act_on(&self, order: &Order) -> bool {
        match self {
            Actor::User(user_id) => order.user_id == *user_id,
            Actor::Admin => true,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Shipping address snapshot taken at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(custom(function = "not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "not_blank"))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub street: String,
    #[validate(custom(function = "not_blank"))]
    pub city: String,
    #[validate(custom(function = "not_blank"))]
    pub state: String,
    #[validate(custom(function = "not_blank"))]
    pub zipcode: String,
    #[validate(custom(function = "not_blank"))]
    pub country: String,
    #[validate(custom(function = "not_blank"))]
    pub phone: String,
}

/// A line as the client asks for it. Prices are never taken from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    #[validate(custom(function = "not_blank"))]
    pub product_id: String,
    #[validate(custom(function = "not_blank"))]
    pub size: String,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

/// A priced line captured on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub size: String,
    pub quantity: u32,
    pub price_at_order_time: f64,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price_at_order_time * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub payment_id: String,
    pub payment_status: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<CancelledBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_session_id: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Order {
    /// New order in its initial state: COD orders are placed immediately,
    /// card orders wait for gateway confirmation.
    pub fn new(
        user_id: String,
        items: Vec<OrderItem>,
        amount: f64,
        currency: String,
        address: Address,
        payment_method: PaymentMethod,
    ) -> Self {
        let now = DateTime::now();
        let status = match payment_method {
            PaymentMethod::Cod => OrderStatus::Placed,
            PaymentMethod::Card => OrderStatus::Pending,
        };

        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            items,
            amount,
            currency,
            address,
            payment_method,
            payment: false,
            status,
            payment_details: None,
            cancelled_by: None,
            gateway_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Convert a major-unit amount to the smallest currency unit.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub mod cart;
pub mod order;
pub mod product;

pub use cart::{cart_item_path, validate_cart_key, Cart, CartData};
pub use order::{
    to_minor_units, Actor, Address, CancelledBy, Order, OrderItem, OrderStatus, PaymentDetails,
    PaymentMethod, RequestedItem,
};
pub use product::Product;

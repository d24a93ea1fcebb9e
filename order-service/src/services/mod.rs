pub mod cart;
pub mod gateway;
pub mod memory;
pub mod metrics;
pub mod orders;
pub mod reconciliation;
pub mod repository;
pub mod store;
pub mod stripe;

pub use cart::CartService;
pub use gateway::{GatewayEvent, PaymentGateway};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use orders::{EventOutcome, OrderService, PendingCheckout, PlaceOrderInput};
pub use reconciliation::Reconciler;
pub use repository::MongoStore;
pub use store::{CartStore, OrderStore, ProductCatalog};
pub use stripe::StripeClient;

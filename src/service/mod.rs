// ============================================================================
// Service - order operations behind explicit caller identity
// ============================================================================

pub mod models;
pub mod order_service;
pub mod response;

pub use models::{Caller, CheckoutRequest, OrderItemView, OrderView};
pub use order_service::{Clock, OrderService};
pub use response::{ServiceError, ServiceResponse};

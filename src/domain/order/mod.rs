// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (OrderStatus, ShippingDetails, CurrencyQuote, OrderItem)
// - Order numbers (OrderNumber, OrderPeriod, next_order_number)
// - Events (OrderPlaced, OrderStatusChanged, OrderCurrencyChanged)
// - Commands (PlaceOrder, ChangeStatus, Cancel, ChangeCurrency)
// - Errors (OrderError enum)
// - Aggregate (OrderAggregate with business logic)
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod order_number;
pub mod value_objects;

// Re-export for convenience
pub use aggregate::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use order_number::*;
pub use value_objects::*;

use rust_decimal::Decimal;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid currency rate")]
    InvalidCurrencyRate(Decimal),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Order sequence overflow for {year}-{month:02}")]
    SequenceExhausted { year: i32, month: u32 },

    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Cannot change status of a {0} order")]
    TerminalStatus(OrderStatus),

    #[error("Order cannot be canceled")]
    NotCancellable(OrderStatus),
}

impl OrderError {
    /// Client faults are reported back as validation failures; everything
    /// else needs operator attention.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, OrderError::SequenceExhausted { .. })
    }
}

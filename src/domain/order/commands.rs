use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::order_number::OrderNumber;
use super::value_objects::{CurrencyQuote, OrderStatus, ShippingDetails};
use crate::domain::cart::CartLine;

// ============================================================================
// Order Commands - Represent caller intent against an existing order
// ============================================================================
//
// Placing an order has no prior state and goes through
// `OrderAggregate::place` instead.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    ChangeStatus {
        target: OrderStatus,
        at: DateTime<Utc>,
    },
    Cancel {
        at: DateTime<Utc>,
    },
    ChangeCurrency {
        quote: CurrencyQuote,
    },
}

/// Everything checkout knows when it creates an order.
#[derive(Debug, Clone)]
pub struct PlaceOrder<'a> {
    pub order_number: OrderNumber,
    pub user_id: Uuid,
    pub shipping: ShippingDetails,
    pub quote: CurrencyQuote,
    pub lines: &'a [CartLine],
    pub placed_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order_number::OrderNumber;
use super::value_objects::{CurrencyQuote, OrderStatus};

// ============================================================================
// Order Events - what an accepted command did to the aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    CurrencyChanged(OrderCurrencyChanged),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::CurrencyChanged(_) => "OrderCurrencyChanged",
        }
    }
}

/// Order Placed - checkout turned a cart into an order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPlaced {
    pub order_number: OrderNumber,
    pub user_id: Uuid,
    pub total_amount_base: Decimal,
    pub item_count: usize,
    pub placed_at: DateTime<Utc>,
}

/// Order Status Changed - the owner gets an email for each of these
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}

/// Order Currency Changed - display currency corrected, base amount untouched
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCurrencyChanged {
    pub previous: CurrencyQuote,
    pub current: CurrencyQuote,
}

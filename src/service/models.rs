use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{OrderAggregate, OrderItem, OrderStatus, ShippingDetails};

// ============================================================================
// Request / Response Models
// ============================================================================

/// Identity resolved by the transport layer before any operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Caller {
    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    pub fn can_access(&self, order: &OrderAggregate) -> bool {
        self.is_admin || order.is_owned_by(self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub full_name: String,
    pub phone: String,
    pub country: String,
    pub city: String,
    pub address_line: String,
    pub postal_code: Option<String>,
    pub currency: String,
    pub currency_rate: Decimal,
}

impl CheckoutRequest {
    pub fn shipping(&self) -> ShippingDetails {
        ShippingDetails {
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
            city: self.city.clone(),
            address_line: self.address_line.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name_snapshot: String,
    pub unit_price_base: Decimal,
    pub quantity: i32,
    pub total_base: Decimal,
}

impl OrderItemView {
    fn new(order_id: Uuid, item: &OrderItem) -> Self {
        Self {
            id: item.id,
            order_id,
            product_id: item.product_id,
            product_name_snapshot: item.product_name_snapshot.clone(),
            unit_price_base: item.unit_price_base,
            quantity: item.quantity,
            total_base: item.total_base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,

    pub total_amount_base: Decimal,
    pub currency: String,
    pub currency_rate: Decimal,

    pub full_name: String,
    pub phone: String,
    pub country: String,
    pub city: String,
    pub address_line: String,
    pub postal_code: Option<String>,

    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,

    pub items: Vec<OrderItemView>,
}

impl From<&OrderAggregate> for OrderView {
    fn from(order: &OrderAggregate) -> Self {
        let shipping = &order.shipping;
        Self {
            id: order.id,
            order_number: order.order_number.to_string(),
            user_id: order.user_id,
            status: order.status,
            total_amount_base: order.total_amount_base,
            currency: order.currency.clone(),
            currency_rate: order.currency_rate,
            full_name: shipping.full_name.clone(),
            phone: shipping.phone.clone(),
            country: shipping.country.clone(),
            city: shipping.city.clone(),
            address_line: shipping.address_line.clone(),
            postal_code: shipping.postal_code.clone(),
            created_at: order.created_at,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            completed_at: order.completed_at,
            canceled_at: order.canceled_at,
            items: order
                .items
                .iter()
                .map(|item| OrderItemView::new(order.id, item))
                .collect(),
        }
    }
}

impl From<OrderAggregate> for OrderView {
    fn from(order: OrderAggregate) -> Self {
        OrderView::from(&order)
    }
}

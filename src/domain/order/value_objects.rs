use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use crate::domain::cart::CartLine;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Order lifecycle status.
///
/// The numeric codes are the storage representation and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PendingPayment,
    Paid,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::New,
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn code(self) -> i16 {
        match self {
            OrderStatus::New => 1,
            OrderStatus::PendingPayment => 2,
            OrderStatus::Paid => 3,
            OrderStatus::Processing => 4,
            OrderStatus::Shipped => 5,
            OrderStatus::Completed => 6,
            OrderStatus::Cancelled => 7,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::PendingPayment => "PendingPayment",
            OrderStatus::Paid => "Paid",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Shipping and contact data copied onto the order at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub full_name: String,
    pub phone: String,
    pub country: String,
    pub city: String,
    pub address_line: String,
    pub postal_code: Option<String>,
}

impl ShippingDetails {
    pub fn validate(&self) -> Result<(), OrderError> {
        let required = [
            ("FullName", &self.full_name),
            ("Phone", &self.phone),
            ("Country", &self.country),
            ("City", &self.city),
            ("AddressLine", &self.address_line),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OrderError::MissingField(field));
            }
        }

        Ok(())
    }
}

/// Decimal places a stored currency rate keeps.
pub const MAX_RATE_SCALE: u32 = 6;

/// Rates must stay below 10^12 to fit the stored precision.
const MAX_RATE_INTEGER_DIGITS: u32 = 12;

/// Display currency and its multiplier against the base amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyQuote {
    pub currency: String,
    pub rate: Decimal,
}

impl CurrencyQuote {
    pub fn new(currency: impl Into<String>, rate: Decimal) -> Result<Self, OrderError> {
        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(OrderError::MissingField("Currency"));
        }
        if rate <= Decimal::ZERO
            || rate.normalize().scale() > MAX_RATE_SCALE
            || rate >= Decimal::from(10_i64.pow(MAX_RATE_INTEGER_DIGITS))
        {
            return Err(OrderError::InvalidCurrencyRate(rate));
        }
        Ok(Self { currency, rate })
    }
}

/// Order line frozen at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name_snapshot: String,
    pub unit_price_base: Decimal,
    pub quantity: i32,
    pub total_base: Decimal,
}

impl OrderItem {
    pub fn from_cart_line(line: &CartLine) -> Result<Self, OrderError> {
        if line.quantity <= 0 {
            return Err(OrderError::InvalidQuantity(line.quantity));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            product_id: line.product_id,
            product_name_snapshot: line.product_name.clone(),
            unit_price_base: line.unit_price,
            quantity: line.quantity,
            total_base: line.line_total(),
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

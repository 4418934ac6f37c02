use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{OrderCommand, PlaceOrder};
use super::errors::OrderError;
use super::events::*;
use super::order_number::OrderNumber;
use super::value_objects::{CurrencyQuote, OrderItem, OrderStatus, ShippingDetails};
use crate::domain::aggregate::Aggregate;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub user_id: Uuid,

    pub status: OrderStatus,

    // Money
    pub total_amount_base: Decimal,
    pub currency: String,
    pub currency_rate: Decimal,

    pub shipping: ShippingDetails,

    // Lifecycle
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,

    pub items: Vec<OrderItem>,
}

impl OrderAggregate {
    /// Build a new order from a cart snapshot.
    ///
    /// Prices come from the cart lines, never from the live catalog, and the
    /// total is the sum of the line totals.
    pub fn place(command: PlaceOrder<'_>) -> Result<(Self, OrderEvent), OrderError> {
        if command.lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        command.shipping.validate()?;
        let quote = CurrencyQuote::new(command.quote.currency, command.quote.rate)?;

        let items = command
            .lines
            .iter()
            .map(OrderItem::from_cart_line)
            .collect::<Result<Vec<_>, _>>()?;
        let total_amount_base: Decimal = items.iter().map(|item| item.total_base).sum();

        let order = Self {
            id: Uuid::now_v7(),
            order_number: command.order_number,
            user_id: command.user_id,
            status: OrderStatus::New,
            total_amount_base,
            currency: quote.currency,
            currency_rate: quote.rate,
            shipping: command.shipping,
            created_at: command.placed_at,
            paid_at: None,
            shipped_at: None,
            completed_at: None,
            canceled_at: None,
            items,
        };

        let event = OrderEvent::Placed(OrderPlaced {
            order_number: order.order_number,
            user_id: order.user_id,
            total_amount_base: order.total_amount_base,
            item_count: order.items.len(),
            placed_at: order.created_at,
        });

        Ok((order, event))
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn quote(&self) -> CurrencyQuote {
        CurrencyQuote {
            currency: self.currency.clone(),
            rate: self.currency_rate,
        }
    }

    /// Set the lifecycle timestamp that belongs to `status`, unless an
    /// earlier transition already set it.
    fn stamp(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        let slot = match status {
            OrderStatus::Paid => &mut self.paid_at,
            OrderStatus::Shipped => &mut self.shipped_at,
            OrderStatus::Completed => &mut self.completed_at,
            OrderStatus::Cancelled => &mut self.canceled_at,
            OrderStatus::New | OrderStatus::PendingPayment | OrderStatus::Processing => return,
        };
        slot.get_or_insert(at);
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::ChangeStatus { target, at } => {
                if self.status.is_terminal() {
                    return Err(OrderError::TerminalStatus(self.status));
                }

                Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
                    from: self.status,
                    to: *target,
                    at: *at,
                })])
            }

            OrderCommand::Cancel { at } => {
                if self.status.is_terminal() {
                    return Err(OrderError::NotCancellable(self.status));
                }

                Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
                    from: self.status,
                    to: OrderStatus::Cancelled,
                    at: *at,
                })])
            }

            OrderCommand::ChangeCurrency { quote } => {
                let current = CurrencyQuote::new(quote.currency.clone(), quote.rate)?;

                Ok(vec![OrderEvent::CurrencyChanged(OrderCurrencyChanged {
                    previous: self.quote(),
                    current,
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(_) => {
                // Built by `place`
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                self.stamp(e.to, e.at);
            }
            OrderEvent::CurrencyChanged(e) => {
                self.currency = e.current.currency.clone();
                self.currency_rate = e.current.rate;
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cart::Cart;
    use crate::domain::order::OrderPeriod;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            full_name: "Grace Hopper".to_string(),
            phone: "+1 555 0100".to_string(),
            country: "US".to_string(),
            city: "Arlington".to_string(),
            address_line: "1 Navy Way".to_string(),
            postal_code: Some("22202".to_string()),
        }
    }

    fn july(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, day, 12, 0, 0).unwrap()
    }

    fn place(cart: &Cart) -> Result<(OrderAggregate, OrderEvent), OrderError> {
        let period = OrderPeriod::new(2025, 7).unwrap();
        OrderAggregate::place(PlaceOrder {
            order_number: OrderNumber::new(period, 1).unwrap(),
            user_id: cart.user_id,
            shipping: shipping(),
            quote: CurrencyQuote::new("USD", dec!(1)).unwrap(),
            lines: &cart.lines,
            placed_at: july(1),
        })
    }

    fn sample_cart() -> Cart {
        Cart::new(Uuid::new_v4())
            .with_line(Uuid::new_v4(), "Notebook", dec!(10.00), 2)
            .with_line(Uuid::new_v4(), "Pencil", dec!(5.50), 1)
    }

    fn placed_order() -> OrderAggregate {
        place(&sample_cart()).unwrap().0
    }

    fn change(order: &OrderAggregate, target: OrderStatus, at: DateTime<Utc>) -> OrderAggregate {
        order
            .execute(&OrderCommand::ChangeStatus { target, at })
            .unwrap()
            .0
    }

    #[test]
    fn test_place_builds_order_from_cart() {
        let cart = sample_cart();
        let (order, event) = place(&cart).unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.user_id, cart.user_id);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total_amount_base, dec!(25.50));
        assert_eq!(
            order.total_amount_base,
            order.items.iter().map(|i| i.total_base).sum::<Decimal>()
        );
        assert_eq!(order.items[0].product_name_snapshot, "Notebook");
        assert_eq!(order.created_at, july(1));
        assert!(order.paid_at.is_none());

        match event {
            OrderEvent::Placed(e) => {
                assert_eq!(e.item_count, 2);
                assert_eq!(e.total_amount_base, dec!(25.50));
                assert_eq!(e.order_number.to_string(), "ORD-2025-07-000001");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_place_rejects_empty_cart() {
        let cart = Cart::new(Uuid::new_v4());
        assert_eq!(place(&cart).unwrap_err(), OrderError::EmptyCart);
    }

    #[test]
    fn test_place_rejects_bad_quantity() {
        let cart = Cart::new(Uuid::new_v4()).with_line(Uuid::new_v4(), "Pen", dec!(1), -2);
        assert_eq!(place(&cart).unwrap_err(), OrderError::InvalidQuantity(-2));
    }

    #[test]
    fn test_status_change_stamps_matching_timestamp() {
        let order = placed_order();
        let paid = change(&order, OrderStatus::Paid, july(2));

        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.paid_at, Some(july(2)));
        assert!(paid.shipped_at.is_none());
        // the original value is untouched
        assert_eq!(order.status, OrderStatus::New);
    }

    #[test]
    fn test_shipping_keeps_earlier_paid_at() {
        let order = placed_order();
        let paid = change(&order, OrderStatus::Paid, july(2));
        let shipped = change(&paid, OrderStatus::Shipped, july(3));

        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.shipped_at, Some(july(3)));
        assert_eq!(shipped.paid_at, Some(july(2)));
    }

    #[test]
    fn test_repeated_transition_does_not_restamp() {
        let order = placed_order();
        let paid = change(&order, OrderStatus::Paid, july(2));
        let paid_again = change(&paid, OrderStatus::Paid, july(2) + Duration::hours(5));

        assert_eq!(paid_again.status, OrderStatus::Paid);
        assert_eq!(paid_again.paid_at, Some(july(2)));
    }

    #[test]
    fn test_non_stamping_statuses() {
        let order = placed_order();
        let processing = change(&order, OrderStatus::Processing, july(2));

        assert_eq!(processing.status, OrderStatus::Processing);
        assert!(processing.paid_at.is_none());
        assert!(processing.shipped_at.is_none());
        assert!(processing.completed_at.is_none());
        assert!(processing.canceled_at.is_none());
    }

    #[test]
    fn test_transitions_are_not_strictly_linear() {
        let order = placed_order();
        let shipped = change(&order, OrderStatus::Shipped, july(2));
        let back = change(&shipped, OrderStatus::Processing, july(3));
        assert_eq!(back.status, OrderStatus::Processing);
        assert_eq!(back.shipped_at, Some(july(2)));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let order = placed_order();
        for terminal in [OrderStatus::Completed, OrderStatus::Cancelled] {
            let done = change(&order, terminal, july(2));
            for target in OrderStatus::ALL {
                let result = done.handle_command(&OrderCommand::ChangeStatus { target, at: july(3) });
                assert_eq!(result.unwrap_err(), OrderError::TerminalStatus(terminal));
            }
        }
    }

    #[test]
    fn test_cancel_from_open_state() {
        let order = placed_order();
        let (cancelled, events) = order.execute(&OrderCommand::Cancel { at: july(4) }).unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.canceled_at, Some(july(4)));
        assert_eq!(
            events,
            vec![OrderEvent::StatusChanged(OrderStatusChanged {
                from: OrderStatus::New,
                to: OrderStatus::Cancelled,
                at: july(4),
            })]
        );
    }

    #[test]
    fn test_cancel_completed_order_fails() {
        let completed = change(&placed_order(), OrderStatus::Completed, july(2));
        let result = completed.execute(&OrderCommand::Cancel { at: july(3) });

        assert_eq!(
            result.unwrap_err(),
            OrderError::NotCancellable(OrderStatus::Completed)
        );
        assert_eq!(completed.status, OrderStatus::Completed);
    }

    #[test]
    fn test_change_currency_leaves_totals_and_status() {
        let order = placed_order();
        let quote = CurrencyQuote::new("EUR", dec!(0.92)).unwrap();
        let (updated, events) = order
            .execute(&OrderCommand::ChangeCurrency { quote: quote.clone() })
            .unwrap();

        assert_eq!(updated.currency, "EUR");
        assert_eq!(updated.currency_rate, dec!(0.92));
        assert_eq!(updated.total_amount_base, order.total_amount_base);
        assert_eq!(updated.status, order.status);
        assert_eq!(
            events,
            vec![OrderEvent::CurrencyChanged(OrderCurrencyChanged {
                previous: order.quote(),
                current: quote,
            })]
        );
    }

    #[test]
    fn test_change_currency_revalidates_rate() {
        let order = placed_order();
        let quote = CurrencyQuote {
            currency: "EUR".to_string(),
            rate: Decimal::ZERO,
        };
        let result = order.handle_command(&OrderCommand::ChangeCurrency { quote });
        assert_eq!(result.unwrap_err(), OrderError::InvalidCurrencyRate(Decimal::ZERO));
    }
}

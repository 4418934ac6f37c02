use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::models::{Caller, CheckoutRequest, OrderView};
use super::response::{ServiceError, ServiceResponse};
use crate::domain::cart::Cart;
use crate::domain::order::{
    next_order_number, CurrencyQuote, OrderAggregate, OrderCommand, OrderError, OrderEvent,
    OrderNumber, OrderPeriod, OrderStatus, PlaceOrder, ShippingDetails,
};
use crate::domain::Aggregate;
use crate::metrics::{CheckoutOutcome, Metrics};
use crate::notifications::{NotificationSink, StatusNotification};
use crate::store::{CartSource, OrderRepository, OrderTransaction};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Order Service - the operations the web layer calls
// ============================================================================
//
// Checkout is the only multi-step unit of work: number allocation, order
// insert and cart trimming share one store transaction, and the whole unit
// is retried when a concurrent checkout claims the same order number. If the
// snapshotted cart lines are no longer there to remove, the cart was already
// checked out and the unit rolls back.
//
// Status, cancel and currency changes load the order, run a command on the
// aggregate, persist the result and then hand status notifications to the
// sink. The write only lands if the stored status is still the one that was
// loaded; otherwise the caller gets a retryable 409. The sink never blocks
// and never fails the operation.
//
// ============================================================================

pub type Clock = fn() -> DateTime<Utc>;

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartSource>,
    notifications: Arc<dyn NotificationSink>,
    metrics: Arc<Metrics>,
    checkout_retry: RetryConfig,
    clock: Clock,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartSource>,
        notifications: Arc<dyn NotificationSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orders,
            carts,
            notifications,
            metrics,
            checkout_retry: RetryConfig::default(),
            clock: Utc::now,
        }
    }

    pub fn with_checkout_retry(mut self, retry: RetryConfig) -> Self {
        self.checkout_retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    #[instrument(name = "order.checkout", skip_all, fields(user_id = %caller.user_id))]
    pub async fn checkout(&self, caller: Caller, request: CheckoutRequest) -> ServiceResponse<OrderView> {
        let started = Instant::now();
        info!("Checkout started");

        let result = self.try_checkout(caller, &request).await;

        let outcome = match &result {
            Ok(_) => CheckoutOutcome::Created,
            Err(ServiceError::Conflict) => CheckoutOutcome::Conflict,
            Err(e) if e.is_client_fault() => CheckoutOutcome::Rejected,
            Err(_) => CheckoutOutcome::Failed,
        };
        self.metrics
            .record_checkout(outcome, started.elapsed().as_secs_f64());

        ServiceResponse::from_result(
            result.map(OrderView::from),
            "checkout",
            "Created order successfully",
        )
    }

    async fn try_checkout(
        &self,
        caller: Caller,
        request: &CheckoutRequest,
    ) -> Result<OrderAggregate, ServiceError> {
        let shipping = request.shipping();
        shipping.validate()?;
        let quote = CurrencyQuote::new(request.currency.clone(), request.currency_rate)?;

        let cart = match self.carts.get_cart(caller.user_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(OrderError::EmptyCart.into()),
        };
        info!(cart_id = %cart.id, items = cart.lines.len(), "Cart loaded");

        let order = retry_on_transient(self.checkout_retry.clone(), |attempt| {
            self.place_order(caller.user_id, &cart, &shipping, &quote, attempt)
        })
        .await
        .into_result()?;

        info!(
            order_number = %order.order_number,
            total_amount_base = %order.total_amount_base,
            "Checkout completed, cart cleared"
        );
        Ok(order)
    }

    /// One checkout attempt inside its own transaction.
    async fn place_order(
        &self,
        user_id: Uuid,
        cart: &Cart,
        shipping: &ShippingDetails,
        quote: &CurrencyQuote,
        attempt: u32,
    ) -> Result<OrderAggregate, ServiceError> {
        let placed_at = (self.clock)();
        debug!(attempt, "Opening checkout transaction");
        let mut tx = self.orders.begin().await?;
        let written = self
            .write_order(tx.as_mut(), user_id, cart, shipping, quote, placed_at)
            .await;

        let result = match written {
            Ok(order) => tx.commit().await.map(|()| order).map_err(ServiceError::from),
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Checkout rollback failed");
                }
                Err(error)
            }
        };

        if let Err(ServiceError::Conflict) = &result {
            self.metrics.record_checkout_conflict();
            warn!(attempt, "Order number taken by a concurrent checkout");
        }
        result
    }

    async fn write_order(
        &self,
        tx: &mut dyn OrderTransaction,
        user_id: Uuid,
        cart: &Cart,
        shipping: &ShippingDetails,
        quote: &CurrencyQuote,
        placed_at: DateTime<Utc>,
    ) -> Result<OrderAggregate, ServiceError> {
        let period = OrderPeriod::of(placed_at)?;
        let last = tx.last_order_number(period).await?;
        let order_number = next_order_number(period, last.as_ref())?;
        debug!(order_number = %order_number, "Allocated order number");

        let (order, _placed) = OrderAggregate::place(PlaceOrder {
            order_number,
            user_id,
            shipping: shipping.clone(),
            quote: quote.clone(),
            lines: &cart.lines,
            placed_at,
        })?;

        tx.insert_order(&order).await?;
        let removed = tx.remove_cart_lines(cart.id, &cart.line_ids()).await?;
        if removed != cart.lines.len() as u64 {
            // Another checkout already took some of these lines
            warn!(
                order_number = %order.order_number,
                expected = cart.lines.len(),
                removed,
                "Cart lines vanished during checkout"
            );
            return Err(ServiceError::CartChanged);
        }
        debug!(order_number = %order.order_number, removed, "Order persisted, cart lines removed");

        Ok(order)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[instrument(name = "order.get_my_orders", skip_all, fields(user_id = %caller.user_id))]
    pub async fn get_my_orders(&self, caller: Caller) -> ServiceResponse<Vec<OrderView>> {
        let result = self
            .orders
            .list_for_user(caller.user_id)
            .await
            .map(views)
            .map_err(ServiceError::from);

        ServiceResponse::from_result(result, "get_my_orders", "Success")
    }

    #[instrument(name = "order.get_all_orders", skip_all, fields(user_id = %caller.user_id))]
    pub async fn get_all_orders(&self, caller: Caller) -> ServiceResponse<Vec<OrderView>> {
        let result = self.try_get_all_orders(caller).await;
        ServiceResponse::from_result(result, "get_all_orders", "Success")
    }

    async fn try_get_all_orders(&self, caller: Caller) -> Result<Vec<OrderView>, ServiceError> {
        if !caller.is_admin {
            return Err(ServiceError::Forbidden);
        }
        let orders = self.orders.list_all().await?;
        info!(count = orders.len(), "Loaded all orders");
        Ok(views(orders))
    }

    #[instrument(name = "order.get_by_number", skip_all, fields(user_id = %caller.user_id, order_number))]
    pub async fn get_order_by_number(&self, caller: Caller, order_number: &str) -> ServiceResponse<OrderView> {
        tracing::Span::current().record("order_number", order_number);

        let result = self
            .load_accessible(caller, order_number)
            .await
            .map(OrderView::from);

        ServiceResponse::from_result(result, "get_order_by_number", "Success")
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[instrument(name = "order.cancel", skip_all, fields(user_id = %caller.user_id, order_number))]
    pub async fn cancel_order(&self, caller: Caller, order_number: &str) -> ServiceResponse<OrderView> {
        tracing::Span::current().record("order_number", order_number);
        info!("Cancel requested");

        let result = self.try_cancel(caller, order_number).await;
        ServiceResponse::from_result(result, "cancel_order", "Order canceled successfully")
    }

    async fn try_cancel(&self, caller: Caller, order_number: &str) -> Result<OrderView, ServiceError> {
        let order = self.load_accessible(caller, order_number).await?;
        let cancelled = self
            .apply(order, OrderCommand::Cancel { at: (self.clock)() })
            .await?;
        info!("Order canceled");
        Ok(OrderView::from(cancelled))
    }

    #[instrument(name = "order.change_status", skip_all, fields(user_id = %caller.user_id, order_number, target = %status))]
    pub async fn change_status(
        &self,
        caller: Caller,
        order_number: &str,
        status: OrderStatus,
    ) -> ServiceResponse<OrderView> {
        tracing::Span::current().record("order_number", order_number);
        info!("Status change requested");

        let result = self.try_change_status(caller, order_number, status).await;
        ServiceResponse::from_result(result, "change_status", "Order status updated successfully")
    }

    async fn try_change_status(
        &self,
        caller: Caller,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let order = self.load_accessible(caller, order_number).await?;
        let command = OrderCommand::ChangeStatus {
            target: status,
            at: (self.clock)(),
        };
        let updated = self.apply(order, command).await?;
        info!(status = %updated.status, "Order status updated");
        Ok(OrderView::from(updated))
    }

    #[instrument(name = "order.change_currency", skip_all, fields(user_id = %caller.user_id, order_number, currency))]
    pub async fn change_currency(
        &self,
        caller: Caller,
        order_number: &str,
        currency: &str,
        rate: Decimal,
    ) -> ServiceResponse<OrderView> {
        let span = tracing::Span::current();
        span.record("order_number", order_number);
        span.record("currency", currency);

        let result = self.try_change_currency(caller, order_number, currency, rate).await;
        ServiceResponse::from_result(result, "change_currency", "Currency updated successfully")
    }

    async fn try_change_currency(
        &self,
        caller: Caller,
        order_number: &str,
        currency: &str,
        rate: Decimal,
    ) -> Result<OrderView, ServiceError> {
        if !caller.is_admin {
            return Err(ServiceError::Forbidden);
        }
        let order = self.load_accessible(caller, order_number).await?;
        let command = OrderCommand::ChangeCurrency {
            quote: CurrencyQuote {
                currency: currency.to_string(),
                rate,
            },
        };
        let updated = self.apply(order, command).await?;
        info!(rate = %updated.currency_rate, "Order currency updated");
        Ok(OrderView::from(updated))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Not-found wins over forbidden, and a malformed number is simply not found.
    async fn load_accessible(&self, caller: Caller, raw: &str) -> Result<OrderAggregate, ServiceError> {
        let number: OrderNumber = raw.parse().map_err(|_| ServiceError::OrderNotFound)?;

        let order = self
            .orders
            .find_by_number(&number)
            .await?
            .ok_or(ServiceError::OrderNotFound)?;

        if !caller.can_access(&order) {
            return Err(ServiceError::Forbidden);
        }
        Ok(order)
    }

    /// Run `command`, persist the new state, then announce status changes.
    async fn apply(
        &self,
        order: OrderAggregate,
        command: OrderCommand,
    ) -> Result<OrderAggregate, ServiceError> {
        let (updated, events) = order.execute(&command)?;
        self.orders.update_order(&updated, order.status).await?;

        for event in &events {
            debug!(event_type = event.event_type(), "Order event applied");

            if let OrderEvent::StatusChanged(change) = event {
                self.metrics
                    .record_status_transition(change.from.as_str(), change.to.as_str());
                self.notifications.notify(StatusNotification {
                    order_number: updated.order_number,
                    user_id: updated.user_id,
                    status: change.to,
                });
            }
        }

        Ok(updated)
    }
}

fn views(orders: Vec<OrderAggregate>) -> Vec<OrderView> {
    orders.iter().map(OrderView::from).collect()
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::repository::{
    CartSource, OrderRepository, OrderTransaction, StoreError, StoreResult, UserDirectory,
};
use crate::domain::cart::Cart;
use crate::domain::order::{OrderAggregate, OrderNumber, OrderPeriod, OrderStatus};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Keeps orders, carts and user emails behind one async mutex. A transaction
// owns the mutex guard for its whole lifetime, so transactions are fully
// serialized and writes stay staged until commit.
//
// Failure injection lets tests break a checkout at a precise point.
//
// ============================================================================

/// A failure the store raises once, on the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `insert_order` reports a duplicate order number.
    InsertConflict,
    /// `remove_cart_lines` fails as if the database went away.
    CartClearFailure,
}

#[derive(Default)]
struct MemoryState {
    orders: Vec<OrderAggregate>,
    carts: HashMap<Uuid, Cart>,
    emails: HashMap<Uuid, String>,
    faults: HashMap<Fault, u32>,
}

impl MemoryState {
    fn take_fault(&mut self, fault: Fault) -> bool {
        match self.faults.get_mut(&fault) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn last_order_number(&self, period: OrderPeriod) -> Option<OrderNumber> {
        self.orders
            .iter()
            .map(|order| order.order_number)
            .filter(|number| number.period() == period)
            .max()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cart of `cart.user_id`.
    pub async fn put_cart(&self, cart: Cart) {
        self.state.lock().await.carts.insert(cart.user_id, cart);
    }

    pub async fn put_user_email(&self, user_id: Uuid, email: impl Into<String>) {
        self.state.lock().await.emails.insert(user_id, email.into());
    }

    /// Arm `fault` for the next `times` matching calls.
    pub async fn inject(&self, fault: Fault, times: u32) {
        *self.state.lock().await.faults.entry(fault).or_default() += times;
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            staged_orders: Vec::new(),
            staged_removals: Vec::new(),
        }))
    }

    async fn update_order(&self, order: &OrderAggregate, expected: OrderStatus) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .orders
            .iter_mut()
            .find(|stored| stored.id == order.id)
            .ok_or_else(|| StoreError::NotFound(format!("Order {}", order.order_number)))?;
        if stored.status != expected {
            return Err(StoreError::Conflict);
        }
        *stored = order.clone();
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.orders.len();
        state.orders.retain(|order| order.id != id);
        Ok(state.orders.len() < before)
    }

    async fn find_by_number(&self, number: &OrderNumber) -> StoreResult<Option<OrderAggregate>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|order| &order.order_number == number)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<OrderAggregate>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|order| order.user_id == user_id && order.status != OrderStatus::Cancelled)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<OrderAggregate>> {
        Ok(self.state.lock().await.orders.clone())
    }

    async fn last_order_number(&self, period: OrderPeriod) -> StoreResult<Option<OrderNumber>> {
        Ok(self.state.lock().await.last_order_number(period))
    }
}

#[async_trait]
impl CartSource for MemoryStore {
    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self.state.lock().await.carts.get(&user_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn email_of(&self, user_id: Uuid) -> StoreResult<Option<String>> {
        Ok(self.state.lock().await.emails.get(&user_id).cloned())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged_orders: Vec<OrderAggregate>,
    staged_removals: Vec<(Uuid, Vec<Uuid>)>,
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn last_order_number(&mut self, period: OrderPeriod) -> StoreResult<Option<OrderNumber>> {
        let committed = self.guard.last_order_number(period);
        let staged = self
            .staged_orders
            .iter()
            .map(|order| order.order_number)
            .filter(|number| number.period() == period)
            .max();
        Ok(committed.max(staged))
    }

    async fn insert_order(&mut self, order: &OrderAggregate) -> StoreResult<()> {
        if self.guard.take_fault(Fault::InsertConflict) {
            return Err(StoreError::Conflict);
        }

        let taken = self
            .guard
            .orders
            .iter()
            .chain(self.staged_orders.iter())
            .any(|existing| existing.order_number == order.order_number || existing.id == order.id);
        if taken {
            return Err(StoreError::Conflict);
        }

        self.staged_orders.push(order.clone());
        Ok(())
    }

    async fn remove_cart_lines(&mut self, cart_id: Uuid, line_ids: &[Uuid]) -> StoreResult<u64> {
        if self.guard.take_fault(Fault::CartClearFailure) {
            return Err(StoreError::Unavailable("cart storage".to_string()));
        }

        let cart = self
            .guard
            .carts
            .values()
            .find(|cart| cart.id == cart_id)
            .ok_or_else(|| StoreError::NotFound(format!("Cart {cart_id}")))?;
        let matched = cart
            .lines
            .iter()
            .filter(|line| line_ids.contains(&line.id))
            .count() as u64;

        self.staged_removals.push((cart_id, line_ids.to_vec()));
        Ok(matched)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            mut guard,
            staged_orders,
            staged_removals,
        } = *self;

        guard.orders.extend(staged_orders);
        for (cart_id, line_ids) in staged_removals {
            if let Some(cart) = guard.carts.values_mut().find(|cart| cart.id == cart_id) {
                cart.lines.retain(|line| !line_ids.contains(&line.id));
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        // Staged writes die with the guard
        Ok(())
    }
}

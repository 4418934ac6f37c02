use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::cart::Cart;
use crate::domain::order::{OrderAggregate, OrderNumber, OrderPeriod, OrderStatus};
use crate::utils::IsTransient;

// ============================================================================
// Persistence Boundary
// ============================================================================
//
// Responsibilities:
// 1. Orders: create (transactional), update, delete, look up, list
// 2. Carts: read a snapshot, drop checked-out lines inside the same
//    transaction that writes the order
// 3. Users: resolve a notification address
//
// Only checkout needs a multi-statement transaction. Every other call is a
// single-aggregate write.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Write conflicts with a concurrent change")]
    Conflict,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Open the unit of work used by checkout.
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>>;

    /// Persist status, timestamps and currency of an existing order, provided
    /// its stored status is still `expected`. A different stored status is a
    /// `Conflict`.
    async fn update_order(&self, order: &OrderAggregate, expected: OrderStatus) -> StoreResult<()>;

    /// Remove an order and its items. Returns whether anything was deleted.
    async fn delete_order(&self, id: Uuid) -> StoreResult<bool>;

    async fn find_by_number(&self, number: &OrderNumber) -> StoreResult<Option<OrderAggregate>>;

    /// Orders of one user, cancelled ones excluded.
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<OrderAggregate>>;

    async fn list_all(&self) -> StoreResult<Vec<OrderAggregate>>;

    /// Highest order number issued in `period`.
    async fn last_order_number(&self, period: OrderPeriod) -> StoreResult<Option<OrderNumber>>;
}

/// Checkout unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Same contract as [`OrderRepository::last_order_number`], but number
    /// allocation for `period` is serialized until this transaction ends.
    async fn last_order_number(&mut self, period: OrderPeriod) -> StoreResult<Option<OrderNumber>>;

    /// Insert order and items. A duplicate order number is a `Conflict`.
    async fn insert_order(&mut self, order: &OrderAggregate) -> StoreResult<()>;

    /// Remove the given lines from a cart, returning how many were removed.
    async fn remove_cart_lines(&mut self, cart_id: Uuid, line_ids: &[Uuid]) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait CartSource: Send + Sync {
    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Option<Cart>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_of(&self, user_id: Uuid) -> StoreResult<Option<String>>;
}

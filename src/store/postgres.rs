use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::repository::{
    CartSource, OrderRepository, OrderTransaction, StoreError, StoreResult, UserDirectory,
};
use crate::config::DatabaseConfig;
use crate::domain::cart::{Cart, CartLine};
use crate::domain::order::{
    OrderAggregate, OrderItem, OrderNumber, OrderPeriod, OrderStatus, ShippingDetails,
};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Order numbers are allocated under a transaction-scoped advisory lock keyed
// by month, so two checkouts in the same month queue up on the lock instead
// of racing for the unique index. The index still backs it up: a duplicate
// surfaces as `StoreError::Conflict` and the caller retries.
//
// ============================================================================

/// Keeps order-number locks clear of any other advisory lock user.
const ORDER_NUMBER_LOCK_NAMESPACE: i64 = 0x4f52_4400_0000_0000;

/// SQLSTATEs that mean "someone else got there first".
const CONFLICT_CODES: [&str; 3] = [
    "23505", // unique_violation
    "40001", // serialization_failure
    "40P01", // deadlock_detected
];

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, total_amount_base, currency, \
     currency_rate, full_name, phone, country, city, address_line, postal_code, created_at, \
     paid_at, shipped_at, completed_at, canceled_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn load_orders(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<OrderAggregate>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, product_name_snapshot, unit_price_base, quantity, total_base \
             FROM order_items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "load_order_items"))?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let (order_id, item) = row.into_item();
            items_by_order.entry(order_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                row.into_aggregate(items)
            })
            .collect()
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "begin"))?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn update_order(&self, order: &OrderAggregate, expected: OrderStatus) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, currency = $3, currency_rate = $4, \
             paid_at = $5, shipped_at = $6, completed_at = $7, canceled_at = $8 \
             WHERE id = $1 AND status = $9",
        )
        .bind(order.id)
        .bind(order.status.code())
        .bind(&order.currency)
        .bind(order.currency_rate)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .bind(order.canceled_at)
        .bind(expected.code())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "update_order"))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(order.id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "update_order"))?;

        if exists {
            warn!(
                order_number = %order.order_number,
                expected = %expected,
                "Order status moved underneath the update"
            );
            Err(StoreError::Conflict)
        } else {
            Err(StoreError::NotFound(format!("Order {}", order.order_number)))
        }
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool> {
        // order_items go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "delete_order"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_number(&self, number: &OrderNumber) -> StoreResult<Option<OrderAggregate>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "find_by_number"))?;

        match row {
            Some(row) => Ok(self.load_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<OrderAggregate>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND status <> $2 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(OrderStatus::Cancelled.code())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "list_for_user"))?;

        self.load_orders(rows).await
    }

    async fn list_all(&self) -> StoreResult<Vec<OrderAggregate>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "list_all"))?;

        self.load_orders(rows).await
    }

    async fn last_order_number(&self, period: OrderPeriod) -> StoreResult<Option<OrderNumber>> {
        let raw: Option<String> = sqlx::query_scalar(LAST_ORDER_NUMBER_SQL)
            .bind(number_pattern(period))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "last_order_number"))?;

        raw.map(|raw| parse_stored_number(&raw)).transpose()
    }
}

/// Numbers are fixed width, so the text maximum is the highest sequence.
const LAST_ORDER_NUMBER_SQL: &str = "SELECT order_number FROM orders \
     WHERE order_number LIKE $1 \
     ORDER BY order_number DESC LIMIT 1";

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTransaction for PgTransaction {
    async fn last_order_number(&mut self, period: OrderPeriod) -> StoreResult<Option<OrderNumber>> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(order_number_lock_key(period))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(e, "order_number_lock"))?;

        debug!(period = %period, "Acquired order number lock");

        let raw: Option<String> = sqlx::query_scalar(LAST_ORDER_NUMBER_SQL)
            .bind(number_pattern(period))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(e, "last_order_number"))?;

        raw.map(|raw| parse_stored_number(&raw)).transpose()
    }

    async fn insert_order(&mut self, order: &OrderAggregate) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ))
        .bind(order.id)
        .bind(order.order_number.to_string())
        .bind(order.user_id)
        .bind(order.status.code())
        .bind(order.total_amount_base)
        .bind(&order.currency)
        .bind(order.currency_rate)
        .bind(&order.shipping.full_name)
        .bind(&order.shipping.phone)
        .bind(&order.shipping.country)
        .bind(&order.shipping.city)
        .bind(&order.shipping.address_line)
        .bind(&order.shipping.postal_code)
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .bind(order.canceled_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(e, "insert_order"))?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items \
                 (id, order_id, product_id, product_name_snapshot, unit_price_base, quantity, total_base) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.product_name_snapshot)
            .bind(item.unit_price_base)
            .bind(item.quantity)
            .bind(item.total_base)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(e, "insert_order_item"))?;
        }

        Ok(())
    }

    async fn remove_cart_lines(&mut self, cart_id: Uuid, line_ids: &[Uuid]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = ANY($2)")
            .bind(cart_id)
            .bind(line_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(e, "remove_cart_lines"))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error(e, "commit"))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error(e, "rollback"))
    }
}

#[async_trait]
impl CartSource for PgStore {
    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        let cart_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "get_cart"))?;

        let Some(cart_id) = cart_id else {
            return Ok(None);
        };

        let lines: Vec<CartLineRow> = sqlx::query_as(
            "SELECT ci.id, ci.product_id, p.name AS product_name, ci.quantity, ci.unit_price \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 ORDER BY ci.id",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "get_cart_lines"))?;

        Ok(Some(Cart {
            id: cart_id,
            user_id,
            lines: lines.into_iter().map(CartLine::from).collect(),
        }))
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn email_of(&self, user_id: Uuid) -> StoreResult<Option<String>> {
        sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "email_of"))
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: i16,
    total_amount_base: Decimal,
    currency: String,
    currency_rate: Decimal,
    full_name: String,
    phone: String,
    country: String,
    city: String,
    address_line: String,
    postal_code: Option<String>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_aggregate(self, items: Vec<OrderItem>) -> StoreResult<OrderAggregate> {
        let status = OrderStatus::from_code(self.status).ok_or_else(|| {
            StoreError::Corrupt(format!("order {} has status code {}", self.id, self.status))
        })?;
        let order_number = parse_stored_number(&self.order_number)?;

        Ok(OrderAggregate {
            id: self.id,
            order_number,
            user_id: self.user_id,
            status,
            total_amount_base: self.total_amount_base,
            currency: self.currency,
            currency_rate: self.currency_rate,
            shipping: ShippingDetails {
                full_name: self.full_name,
                phone: self.phone,
                country: self.country,
                city: self.city,
                address_line: self.address_line,
                postal_code: self.postal_code,
            },
            created_at: self.created_at,
            paid_at: self.paid_at,
            shipped_at: self.shipped_at,
            completed_at: self.completed_at,
            canceled_at: self.canceled_at,
            items,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name_snapshot: String,
    unit_price_base: Decimal,
    quantity: i32,
    total_base: Decimal,
}

impl OrderItemRow {
    fn into_item(self) -> (Uuid, OrderItem) {
        (
            self.order_id,
            OrderItem {
                id: self.id,
                product_id: self.product_id,
                product_name_snapshot: self.product_name_snapshot,
                unit_price_base: self.unit_price_base,
                quantity: self.quantity,
                total_base: self.total_base,
            },
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        CartLine {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

fn parse_stored_number(raw: &str) -> StoreResult<OrderNumber> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("stored order number {raw:?} is malformed")))
}

fn number_pattern(period: OrderPeriod) -> String {
    format!("{}%", period.number_prefix())
}

fn order_number_lock_key(period: OrderPeriod) -> i64 {
    ORDER_NUMBER_LOCK_NAMESPACE + i64::from(period.year) * 100 + i64::from(period.month)
}

fn is_conflict_code(code: Option<&str>) -> bool {
    code.is_some_and(|code| CONFLICT_CODES.contains(&code))
}

fn map_sqlx_error(error: sqlx::Error, operation: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if is_conflict_code(db_error.code().as_deref()) {
            warn!(
                error = %db_error,
                operation,
                "Write conflicted with a concurrent transaction"
            );
            return StoreError::Conflict;
        }
    }

    error!(error = %error, operation, "Database operation failed");
    StoreError::Database(error)
}

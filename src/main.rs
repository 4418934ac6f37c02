use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use storefront_orders::config::AppConfig;
use storefront_orders::domain::cart::Cart;
use storefront_orders::domain::order::OrderStatus;
use storefront_orders::metrics::{self, Metrics};
use storefront_orders::notifications::{LogNotifier, NotificationActor};
use storefront_orders::service::{Caller, CheckoutRequest, OrderService};
use storefront_orders::store::{CartSource, MemoryStore, OrderRepository, PgStore, UserDirectory};
use storefront_orders::utils::CircuitBreaker;

struct Stores {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartSource>,
    users: Arc<dyn UserDirectory>,
    /// Set when running without a database; the demo seeds it
    memory: Option<MemoryStore>,
}

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storefront_orders=debug")),
        )
        .init();

    tracing::info!("Starting storefront order service");

    let config = AppConfig::from_env()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, metrics_port)) {
            tracing::error!(error = %e, "Metrics server stopped");
        }
    });

    // === 2. Storage ===
    let stores = open_stores(&config).await?;

    // === 3. Notification actor ===
    let notifier = NotificationActor::new(
        stores.users.clone(),
        Arc::new(LogNotifier),
        CircuitBreaker::new("mail", config.notifications.breaker()),
        config.notifications.retry(),
        metrics.clone(),
    )
    .start();

    // === 4. Order service ===
    let service = OrderService::new(
        stores.orders.clone(),
        stores.carts.clone(),
        Arc::new(notifier),
        metrics.clone(),
    )
    .with_checkout_retry(config.checkout_retry());

    match stores.memory {
        Some(memory) => {
            run_demo(&service, &memory).await?;
            // let the actor drain its mailbox
            tokio::time::sleep(Duration::from_millis(500)).await;
            tracing::info!("Demo complete");
        }
        None => {
            tracing::info!("Order service ready, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match &config.database {
        Some(database) => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = Arc::new(PgStore::connect(database).await?);
            store.migrate().await?;
            Ok(Stores {
                orders: store.clone(),
                carts: store.clone(),
                users: store,
                memory: None,
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let store = MemoryStore::new();
            Ok(Stores {
                orders: Arc::new(store.clone()),
                carts: Arc::new(store.clone()),
                users: Arc::new(store.clone()),
                memory: Some(store),
            })
        }
    }
}

/// Walk one order through checkout and its whole lifecycle.
async fn run_demo(service: &OrderService, store: &MemoryStore) -> anyhow::Result<()> {
    let customer = Caller::customer(Uuid::new_v4());
    let admin = Caller::admin(Uuid::new_v4());

    store.put_user_email(customer.user_id, "customer@example.com").await;
    store
        .put_cart(
            Cart::new(customer.user_id)
                .with_line(Uuid::new_v4(), "Mechanical keyboard", Decimal::new(8999, 2), 1)
                .with_line(Uuid::new_v4(), "Desk mat", Decimal::new(1550, 2), 2),
        )
        .await;

    let placed = service
        .checkout(
            customer,
            CheckoutRequest {
                full_name: "Demo Customer".to_string(),
                phone: "+1 555 0100".to_string(),
                country: "US".to_string(),
                city: "Portland".to_string(),
                address_line: "100 Main St".to_string(),
                postal_code: Some("97201".to_string()),
                currency: "EUR".to_string(),
                currency_rate: Decimal::new(92, 2),
            },
        )
        .await;
    let order = placed
        .data
        .ok_or_else(|| anyhow::anyhow!("checkout failed: {}", placed.message))?;
    tracing::info!(
        order_number = %order.order_number,
        total_amount_base = %order.total_amount_base,
        "Order placed"
    );

    for status in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Completed] {
        let response = service.change_status(admin, &order.order_number, status).await;
        tracing::info!(status_code = response.status_code, message = %response.message, "Status change");
    }

    let cancel = service.cancel_order(customer, &order.order_number).await;
    tracing::info!(
        status_code = cancel.status_code,
        message = %cancel.message,
        "Cancel after completion"
    );

    let mine = service.get_my_orders(customer).await;
    tracing::info!(count = mine.data.map(|orders| orders.len()).unwrap_or(0), "Customer orders");

    Ok(())
}

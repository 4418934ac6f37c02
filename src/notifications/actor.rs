use std::sync::Arc;

use actix::prelude::*;

use super::{Notifier, StatusNotification};
use crate::metrics::{Metrics, NotificationOutcome};
use crate::store::UserDirectory;
use crate::utils::{retry_with_backoff, CircuitBreaker, CircuitBreakerError, RetryConfig};

// ============================================================================
// Notification Actor
// ============================================================================
//
// Owns delivery of status change emails:
// - resolves the order owner's address
// - retries the transport with backoff
// - stops calling a dead transport through the circuit breaker
//
// Nothing is reported back to the sender. Every outcome ends up in the log
// and in `notifications_total`.
//
// ============================================================================

pub struct NotificationActor {
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl NotificationActor {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        breaker: CircuitBreaker,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            directory,
            notifier,
            breaker,
            retry,
            metrics,
        }
    }
}

impl Actor for NotificationActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("NotificationActor started");
    }
}

impl Handler<StatusNotification> for NotificationActor {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, msg: StatusNotification, _: &mut Self::Context) -> Self::Result {
        let directory = self.directory.clone();
        let notifier = self.notifier.clone();
        let breaker = self.breaker.clone();
        let retry = self.retry.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            let recipient = match directory.email_of(msg.user_id).await {
                Ok(Some(email)) => email,
                Ok(None) => {
                    tracing::warn!(
                        order_number = %msg.order_number,
                        user_id = %msg.user_id,
                        "No email on file for order owner, skipping notification"
                    );
                    metrics.record_notification(NotificationOutcome::NoRecipient);
                    return;
                }
                Err(e) => {
                    tracing::error!(
                        order_number = %msg.order_number,
                        user_id = %msg.user_id,
                        error = %e,
                        "Failed to resolve notification recipient"
                    );
                    metrics.record_notification(NotificationOutcome::Failed);
                    return;
                }
            };

            let email = msg.to_email(recipient);
            let delivery = breaker.call(async {
                retry_with_backoff(retry, |_attempt| notifier.send(&email))
                    .await
                    .into_result()
            });

            match delivery.await {
                Ok(()) => {
                    tracing::info!(
                        order_number = %msg.order_number,
                        status = %msg.status,
                        "Status notification sent"
                    );
                    metrics.record_notification(NotificationOutcome::Sent);
                }
                Err(CircuitBreakerError::CircuitOpen) => {
                    tracing::warn!(
                        order_number = %msg.order_number,
                        status = %msg.status,
                        "Mail transport circuit open, notification dropped"
                    );
                    metrics.record_notification(NotificationOutcome::CircuitOpen);
                }
                Err(CircuitBreakerError::OperationFailed(e)) => {
                    tracing::error!(
                        order_number = %msg.order_number,
                        status = %msg.status,
                        error = %e,
                        "Status notification failed"
                    );
                    metrics.record_notification(NotificationOutcome::Failed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::notifications::{Email, NotifyError};
    use crate::store::MemoryStore;
    use crate::utils::CircuitBreakerConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    /// Fails the first `failures` sends, then delivers.
    #[derive(Default)]
    struct FlakyNotifier {
        failures: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<Email>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, email: &Email) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(NotifyError::Transport("connection reset".to_string()));
            }
            self.delivered.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    async fn owner(store: &MemoryStore) -> Uuid {
        let user_id = Uuid::new_v4();
        store.put_user_email(user_id, "owner@example.com").await;
        user_id
    }

    fn notification(user_id: Uuid) -> StatusNotification {
        StatusNotification {
            order_number: "ORD-2025-07-000003".parse().unwrap(),
            user_id,
            status: OrderStatus::Paid,
        }
    }

    fn start(
        store: &MemoryStore,
        notifier: Arc<FlakyNotifier>,
        failure_threshold: u32,
        metrics: Arc<Metrics>,
    ) -> Addr<NotificationActor> {
        let breaker = CircuitBreaker::new(
            "mail",
            CircuitBreakerConfig {
                failure_threshold,
                cooldown: Duration::from_secs(60),
                success_threshold: 1,
            },
        );
        NotificationActor::new(
            Arc::new(store.clone()),
            notifier,
            breaker,
            RetryConfig::immediate(3),
            metrics,
        )
        .start()
    }

    #[actix::test]
    async fn test_delivers_to_order_owner() {
        let store = MemoryStore::new();
        let user_id = owner(&store).await;
        let notifier = Arc::new(FlakyNotifier::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let addr = start(&store, notifier.clone(), 5, metrics.clone());

        addr.send(notification(user_id)).await.unwrap();

        let delivered = notifier.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].to, "owner@example.com");
        assert_eq!(
            delivered[0].subject,
            "Changed status of order ORD-2025-07-000003 to Paid"
        );
        assert_eq!(metrics.notifications(NotificationOutcome::Sent), 1);
    }

    #[actix::test]
    async fn test_retries_transient_transport_failures() {
        let store = MemoryStore::new();
        let user_id = owner(&store).await;
        let notifier = Arc::new(FlakyNotifier {
            failures: 2,
            ..FlakyNotifier::default()
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let addr = start(&store, notifier.clone(), 5, metrics.clone());

        addr.send(notification(user_id)).await.unwrap();

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(notifier.delivered.lock().unwrap().len(), 1);
        assert_eq!(metrics.notifications(NotificationOutcome::Sent), 1);
    }

    #[actix::test]
    async fn test_breaker_stops_calling_dead_transport() {
        let store = MemoryStore::new();
        let user_id = owner(&store).await;
        let notifier = Arc::new(FlakyNotifier {
            failures: u32::MAX,
            ..FlakyNotifier::default()
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let addr = start(&store, notifier.clone(), 1, metrics.clone());

        addr.send(notification(user_id)).await.unwrap();
        addr.send(notification(user_id)).await.unwrap();

        // second message never reaches the transport
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.notifications(NotificationOutcome::Failed), 1);
        assert_eq!(metrics.notifications(NotificationOutcome::CircuitOpen), 1);
    }

    #[actix::test]
    async fn test_missing_recipient_is_skipped() {
        let store = MemoryStore::new();
        let notifier = Arc::new(FlakyNotifier::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let addr = start(&store, notifier.clone(), 5, metrics.clone());

        addr.send(notification(Uuid::new_v4())).await.unwrap();

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.notifications(NotificationOutcome::NoRecipient), 1);
    }
}

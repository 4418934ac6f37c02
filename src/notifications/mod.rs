// ============================================================================
// Notifications - status change emails
// ============================================================================
//
// The service hands a `StatusNotification` to a `NotificationSink` and moves
// on. The production sink is the `NotificationActor` mailbox; delivery,
// retries and breaker bookkeeping all happen there, after the status change
// has already been persisted.
//
// ============================================================================

mod actor;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{OrderNumber, OrderStatus};

pub use actor::NotificationActor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// Outbound email transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email dispatched");
        Ok(())
    }
}

/// A status change the order owner should hear about.
#[derive(actix::Message, Debug, Clone, PartialEq, Eq)]
#[rtype(result = "()")]
pub struct StatusNotification {
    pub order_number: OrderNumber,
    pub user_id: Uuid,
    pub status: OrderStatus,
}

impl StatusNotification {
    pub fn subject(&self) -> String {
        format!("Changed status of order {} to {}", self.order_number, self.status)
    }

    pub fn html_body(&self) -> String {
        format!(
            "<!DOCTYPE html>\
             <html><body style=\"font-family: Arial, sans-serif;\">\
             <p>Your order <strong>{}</strong> is now <strong>{}</strong>.</p>\
             <p>Thank you for shopping with us.</p>\
             </body></html>",
            self.order_number, self.status
        )
    }

    pub fn to_email(&self, to: String) -> Email {
        Email {
            to,
            subject: self.subject(),
            html_body: self.html_body(),
        }
    }
}

/// Fire-and-forget handoff. Implementations must not block and must not fail.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: StatusNotification);
}

impl NotificationSink for actix::Addr<NotificationActor> {
    fn notify(&self, notification: StatusNotification) {
        self.do_send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names_order_and_status() {
        let notification = StatusNotification {
            order_number: "ORD-2025-07-000001".parse().unwrap(),
            user_id: Uuid::new_v4(),
            status: OrderStatus::Shipped,
        };

        assert_eq!(
            notification.subject(),
            "Changed status of order ORD-2025-07-000001 to Shipped"
        );

        let email = notification.to_email("owner@example.com".to_string());
        assert_eq!(email.to, "owner@example.com");
        assert!(email.html_body.contains("ORD-2025-07-000001"));
        assert!(email.html_body.contains("Shipped"));
    }
}

mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order workflow
// ============================================================================
//
// - Checkout outcomes and latency
// - Order-number conflicts that forced a checkout retry
// - Status transitions (from, to)
// - Status-change notification delivery
//
// Everything lives in one Registry scraped via /metrics.
// ============================================================================

/// Label values for `checkouts_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Created,
    Rejected,
    Conflict,
    Failed,
}

impl CheckoutOutcome {
    fn label(self) -> &'static str {
        match self {
            CheckoutOutcome::Created => "created",
            CheckoutOutcome::Rejected => "rejected",
            CheckoutOutcome::Conflict => "conflict",
            CheckoutOutcome::Failed => "failed",
        }
    }
}

/// Label values for `notifications_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Failed,
    CircuitOpen,
    NoRecipient,
}

impl NotificationOutcome {
    fn label(self) -> &'static str {
        match self {
            NotificationOutcome::Sent => "sent",
            NotificationOutcome::Failed => "failed",
            NotificationOutcome::CircuitOpen => "circuit_open",
            NotificationOutcome::NoRecipient => "no_recipient",
        }
    }
}

pub struct Metrics {
    registry: Registry,

    pub checkouts_total: IntCounterVec,
    pub checkout_conflicts_total: IntCounter,
    pub checkout_duration: Histogram,

    pub status_transitions_total: IntCounterVec,

    pub notifications_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let checkouts_total = IntCounterVec::new(
            Opts::new("checkouts_total", "Checkout attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(checkouts_total.clone()))?;

        let checkout_conflicts_total = IntCounter::new(
            "checkout_conflicts_total",
            "Checkout units of work that hit an order number conflict",
        )?;
        registry.register(Box::new(checkout_conflicts_total.clone()))?;

        let checkout_duration = Histogram::with_opts(
            HistogramOpts::new("checkout_duration_seconds", "End-to-end checkout duration")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        registry.register(Box::new(checkout_duration.clone()))?;

        let status_transitions_total = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Applied order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Status change notifications by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            registry,
            checkouts_total,
            checkout_conflicts_total,
            checkout_duration,
            status_transitions_total,
            notifications_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_checkout(&self, outcome: CheckoutOutcome, duration_secs: f64) {
        self.checkouts_total.with_label_values(&[outcome.label()]).inc();
        self.checkout_duration.observe(duration_secs);
    }

    pub fn record_checkout_conflict(&self) {
        self.checkout_conflicts_total.inc();
    }

    pub fn record_status_transition(&self, from: &str, to: &str) {
        self.status_transitions_total.with_label_values(&[from, to]).inc();
    }

    pub fn record_notification(&self, outcome: NotificationOutcome) {
        self.notifications_total.with_label_values(&[outcome.label()]).inc();
    }

    pub fn checkouts(&self, outcome: CheckoutOutcome) -> u64 {
        self.checkouts_total.with_label_values(&[outcome.label()]).get()
    }

    pub fn notifications(&self, outcome: NotificationOutcome) -> u64 {
        self.notifications_total.with_label_values(&[outcome.label()]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_checkout_conflict();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_checkout() {
        let metrics = Metrics::new().unwrap();
        metrics.record_checkout(CheckoutOutcome::Created, 0.02);
        metrics.record_checkout(CheckoutOutcome::Created, 0.03);
        metrics.record_checkout(CheckoutOutcome::Rejected, 0.001);

        assert_eq!(metrics.checkouts(CheckoutOutcome::Created), 2);
        assert_eq!(metrics.checkouts(CheckoutOutcome::Rejected), 1);
        assert_eq!(metrics.checkouts(CheckoutOutcome::Conflict), 0);
        assert_eq!(metrics.checkout_duration.get_sample_count(), 3);
    }

    #[test]
    fn test_record_status_transition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_status_transition("New", "Paid");
        metrics.record_status_transition("Paid", "Shipped");
        metrics.record_status_transition("New", "Paid");

        let new_to_paid = metrics
            .status_transitions_total
            .with_label_values(&["New", "Paid"])
            .get();
        assert_eq!(new_to_paid, 2);
    }

    #[test]
    fn test_record_notification() {
        let metrics = Metrics::new().unwrap();
        metrics.record_notification(NotificationOutcome::Sent);
        metrics.record_notification(NotificationOutcome::CircuitOpen);

        assert_eq!(metrics.notifications(NotificationOutcome::Sent), 1);
        assert_eq!(metrics.notifications(NotificationOutcome::CircuitOpen), 1);
        assert_eq!(metrics.notifications(NotificationOutcome::Failed), 0);
    }
}

//! Alert Bus - Publish/Subscribe Channel
//!
//! Cho phép publish alerts từ bất kỳ đâu trong pipeline. Subscribers
//! (planning stage, operator sinks) attach via subscribe(). Each pipeline
//! owns its bus; nothing is process-global.

use tokio::sync::broadcast;

use super::model::Alert;

/// Bus capacity. Slow subscribers that lag past this lose oldest alerts.
const BUS_CAPACITY: usize = 256;

/// Broadcast bus for alerts.
pub struct AlertBus {
    tx: broadcast::Sender<Alert>,
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to the alert stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    /// Publish an alert to all subscribers.
    ///
    /// Silent-drop when nobody is listening - publishing must never crash
    /// the detection path.
    pub fn publish(&self, alert: Alert) {
        if self.tx.receiver_count() == 0 {
            log::warn!("Alert bus has no subscribers, alert '{}' dropped", alert.title);
            return;
        }
        if let Err(e) = self.tx.send(alert) {
            log::error!("Failed to publish alert: {}", e);
        }
    }

    /// Number of live subscribers (for status reporting).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::{Severity, ThreatType};

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = AlertBus::new();
        let mut rx = bus.subscribe();
        let alert = Alert::new(
            Severity::High,
            "test alert",
            "unit test",
            ThreatType::PromptInjection,
            "agent-1",
            "test",
        );
        bus.publish(alert.clone());

        let received = rx.recv().await.expect("alert should arrive");
        assert_eq!(received.id, alert.id);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = AlertBus::new();
        // No receiver held; must not panic.
        bus.publish(Alert::new(
            Severity::Low,
            "dropped",
            "no listeners",
            ThreatType::MaliciousInput,
            "agent-1",
            "test",
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }
}

use kvfeed_protocol::{MutationRecord, ServerEvent};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::registry::SubscriptionRegistry;

/// Outcome of delivering one announcement on this node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Turns decoded announcements into pushes for local subscribers.
#[derive(Debug, Clone)]
pub struct FanoutEngine {
    registry: Arc<SubscriptionRegistry>,
}

impl FanoutEngine {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Pushes `record` to every matching connection, one attempt each.
    ///
    /// A failed push is logged and counted; it neither stops the remaining
    /// pushes nor unsubscribes the connection.
    pub async fn deliver(&self, record: &MutationRecord) -> DeliveryReport {
        let Some(event) = ServerEvent::from_mutation(record) else {
            warn!(app_id = %record.app_id, key = %record.key, kind = %record.kind, "mutation without value, nothing to push");
            return DeliveryReport::default();
        };

        let handles = self.registry.matching_handles(&record.app_id, &record.key).await;
        let mut report = DeliveryReport {
            attempted: handles.len(),
            ..DeliveryReport::default()
        };

        for handle in handles {
            match handle.push(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(conn_id = %handle.id(), event = event.name(), error = %e, "push failed");
                }
            }
        }

        debug!(
            app_id = %record.app_id,
            key = %record.key,
            event = event.name(),
            attempted = report.attempted,
            delivered = report.delivered,
            "fan-out complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::{ConnectionHandle, ConnectionIds};
    use kvfeed_protocol::KeyValue;

    #[tokio::test]
    async fn one_stuck_connection_does_not_block_the_rest() {
        let ids = ConnectionIds::new();
        let registry = Arc::new(SubscriptionRegistry::new());
        let fanout = FanoutEngine::new(Arc::clone(&registry));

        let (stuck, _stuck_rx) = ConnectionHandle::channel(ids.next_id(), 1);
        let (gone, gone_rx) = ConnectionHandle::channel(ids.next_id(), 4);
        let (healthy, mut healthy_rx) = ConnectionHandle::channel(ids.next_id(), 4);
        drop(gone_rx);
        for conn in [&stuck, &gone, &healthy] {
            registry.subscribe_app("x", conn).await;
        }

        let first = fanout.deliver(&MutationRecord::set(KeyValue::new("x", "k", "1"))).await;
        assert_eq!(first, DeliveryReport { attempted: 3, delivered: 2, failed: 1 });

        // `stuck` never drains its queue of one
        let second = fanout.deliver(&MutationRecord::delete("x", "k")).await;
        assert_eq!(second, DeliveryReport { attempted: 3, delivered: 1, failed: 2 });

        assert_eq!(healthy_rx.recv().await.unwrap().name(), "key_set");
        assert_eq!(healthy_rx.recv().await.unwrap().name(), "key_deleted");

        // failures never unsubscribe
        assert_eq!(registry.subscription_count().await, 3);
    }

    #[tokio::test]
    async fn no_subscribers_means_no_attempts() {
        let fanout = FanoutEngine::new(Arc::new(SubscriptionRegistry::new()));
        let report = fanout.deliver(&MutationRecord::delete("x", "k")).await;
        assert_eq!(report, DeliveryReport::default());
    }
}

mod common;

use bytes::Bytes;
use kvfeed::broker::{LogBroker, MemoryLog};
use kvfeed::core::error::BrokerError;
use kvfeed_client::KeyValue;
use kvfeed_protocol::{ConsumeResponse, MutationKind, OffsetReset, ProduceAck};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::{connect, next_event, start_node, wait_for_subscriptions};

/// Fails the first `failures` reads, then behaves like the wrapped log.
struct FlakyBroker {
    log: MemoryLog,
    failures: AtomicUsize,
}

impl LogBroker for FlakyBroker {
    async fn append(&self, topic: &str, key: &[u8], payload: Bytes) -> Result<ProduceAck, BrokerError> {
        self.log.append(topic, key, payload).await
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        reset: OffsetReset,
    ) -> Result<Option<ConsumeResponse>, BrokerError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(BrokerError::Io(io::ErrorKind::ConnectionRefused.into()));
        }
        self.log.fetch(topic, partition, group, reset).await
    }

    async fn partition_count(&self, topic: &str) -> Result<u32, BrokerError> {
        LogBroker::partition_count(&self.log, topic).await
    }

    async fn commit(&self, topic: &str, partition: u32, group: &str, offset: u64) -> Result<(), BrokerError> {
        self.log.commit(topic, partition, group, offset).await
    }
}

#[tokio::test]
async fn consumer_recovers_after_broker_errors() {
    let broker = Arc::new(FlakyBroker {
        log: MemoryLog::new(3),
        failures: AtomicUsize::new(4),
    });
    let node = start_node("flaky", Arc::clone(&broker)).await;

    let mut client = connect(&node).await;
    client.subscribe_key("x", "k1").await.unwrap();
    wait_for_subscriptions(node.registry(), 1).await;

    node.publisher()
        .publish("x", "k1", MutationKind::Set, Some(KeyValue::new("x", "k1", "v1")))
        .await
        .unwrap();
    assert_eq!(next_event(&mut client).await.key(), "k1");

    assert_eq!(broker.failures.load(Ordering::SeqCst), 0);
    assert_eq!(node.stats().errors(), 4);

    node.publisher()
        .publish("x", "k1", MutationKind::Delete, None)
        .await
        .unwrap();
    assert_eq!(next_event(&mut client).await.name(), "key_deleted");
    assert_eq!(node.stats().errors(), 4);

    node.shutdown().await.unwrap();
}

use kvfeed_protocol::{announcement, KeyValue, MutationKind, MutationRecord, ProduceAck};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::LogBroker;
use crate::core::error::PublishError;

struct Inner<B> {
    broker: Arc<B>,
    topic: String,
    timeout: Duration,
}

impl<B: LogBroker> Inner<B> {
    async fn publish(&self, record: &MutationRecord) -> Result<ProduceAck, PublishError> {
        let payload = announcement::encode(record).map_err(PublishError::Encode)?;
        let key = record.log_key();
        let append = self.broker.append(&self.topic, key.as_bytes(), payload);
        let ack = tokio::time::timeout(self.timeout, append)
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;
        debug!(
            app_id = %record.app_id,
            key = %record.key,
            kind = %record.kind,
            partition = ack.partition,
            offset = ack.offset,
            "announcement published"
        );
        Ok(ack)
    }
}

/// Announces committed mutations on the shared log.
///
/// Clones share one background task that drains [`Publisher::submit`] in
/// submission order, so a node's announcements for one key reach the log in
/// the order its writes were issued.
pub struct Publisher<B> {
    inner: Arc<Inner<B>>,
    queue: mpsc::UnboundedSender<MutationRecord>,
}

impl<B> Clone for Publisher<B> {
    fn clone(&self) -> Self {
        Publisher {
            inner: Arc::clone(&self.inner),
            queue: self.queue.clone(),
        }
    }
}

impl<B: LogBroker> Publisher<B> {
    /// Starts the background task; must be called inside a tokio runtime.
    /// The task exits once every clone of the returned publisher is dropped.
    pub fn spawn(broker: Arc<B>, topic: impl Into<String>, timeout: Duration) -> Self {
        let inner = Arc::new(Inner {
            broker,
            topic: topic.into(),
            timeout,
        });
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(Arc::clone(&inner), rx));
        Publisher { inner, queue }
    }

    /// Appends one announcement and waits for the broker's acknowledgement.
    pub async fn publish(
        &self,
        app_id: &str,
        key: &str,
        kind: MutationKind,
        value: Option<KeyValue>,
    ) -> Result<(), PublishError> {
        let record = build_record(app_id, key, kind, value)?;
        self.inner.publish(&record).await.map(|_| ())
    }

    /// Queues an announcement without waiting. Failures are only logged;
    /// the caller's storage write is never affected.
    pub fn submit(&self, app_id: &str, key: &str, kind: MutationKind, value: Option<KeyValue>) {
        let record = match build_record(app_id, key, kind, value) {
            Ok(record) => record,
            Err(e) => {
                warn!(app_id, key, %kind, error = %e, "announcement not submitted");
                return;
            }
        };
        if let Err(mpsc::error::SendError(record)) = self.queue.send(record) {
            warn!(
                app_id = %record.app_id,
                key = %record.key,
                error = %PublishError::Closed,
                "announcement dropped"
            );
        }
    }
}

async fn drain<B: LogBroker>(inner: Arc<Inner<B>>, mut rx: mpsc::UnboundedReceiver<MutationRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = inner.publish(&record).await {
            warn!(
                app_id = %record.app_id,
                key = %record.key,
                kind = %record.kind,
                error = %e,
                "error publishing announcement"
            );
        }
    }
    debug!("publisher queue closed");
}

fn build_record(
    app_id: &str,
    key: &str,
    kind: MutationKind,
    value: Option<KeyValue>,
) -> Result<MutationRecord, PublishError> {
    match (kind, value) {
        (MutationKind::Delete, _) => Ok(MutationRecord::delete(app_id, key)),
        (_, None) => Err(PublishError::InvalidRecord(format!(
            "{} of {}/{} has no value",
            kind, app_id, key
        ))),
        (_, Some(value)) if value.app_id != app_id || value.key != key => {
            Err(PublishError::InvalidRecord(format!(
                "value for {}/{} published under {}/{}",
                value.app_id, value.key, app_id, key
            )))
        }
        (MutationKind::Set, Some(value)) => Ok(MutationRecord::set(value)),
        (MutationKind::Update, Some(value)) => Ok(MutationRecord::update(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryLog;
    use kvfeed_protocol::OffsetReset;

    #[tokio::test]
    async fn publish_appends_decodable_announcement() {
        let log = Arc::new(MemoryLog::new(1));
        let publisher = Publisher::spawn(Arc::clone(&log), "kvstore", Duration::from_secs(1));

        let kv = KeyValue::new("x", "k1", "v1");
        publisher
            .publish("x", "k1", MutationKind::Set, Some(kv.clone()))
            .await
            .unwrap();

        let got = log
            .consume_with_group("kvstore", 0, "reader", OffsetReset::Earliest)
            .await
            .unwrap()
            .unwrap();
        let record = announcement::decode(&got.message.value).unwrap();
        assert_eq!(record, MutationRecord::set(kv));
        assert_eq!(got.message.key.as_deref(), Some(&b"x/k1"[..]));
    }

    #[tokio::test]
    async fn set_without_value_is_rejected_before_the_log() {
        let log = Arc::new(MemoryLog::new(1));
        let publisher = Publisher::spawn(Arc::clone(&log), "kvstore", Duration::from_secs(1));

        let err = publisher
            .publish("x", "k1", MutationKind::Update, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidRecord(_)));

        publisher.submit("x", "k1", MutationKind::Set, Some(KeyValue::new("x", "other", "v")));
        publisher.submit("x", "k1", MutationKind::Delete, None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.len("kvstore").await, 1);
    }

    #[tokio::test]
    async fn submit_preserves_order() {
        let log = Arc::new(MemoryLog::new(3));
        let publisher = Publisher::spawn(Arc::clone(&log), "kvstore", Duration::from_secs(1));

        for i in 0..20 {
            publisher.submit("x", "k", MutationKind::Set, Some(KeyValue::new("x", "k", i.to_string())));
        }
        for _ in 0..100 {
            if log.len("kvstore").await == 20 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut partition = None;
        for p in 0..3 {
            let first = log
                .consume_with_group("kvstore", p, "reader", OffsetReset::Earliest)
                .await
                .unwrap();
            if first.is_some() {
                partition = Some(p);
            }
        }
        let partition = partition.expect("records in one partition");
        for i in 0..20u64 {
            log.commit_offset("kvstore", partition, "check", i).await.unwrap();
            let got = log
                .consume_with_group("kvstore", partition, "check", OffsetReset::Earliest)
                .await
                .unwrap()
                .unwrap();
            let record = announcement::decode(&got.message.value).unwrap();
            assert_eq!(record.value.unwrap().value, i.to_string());
        }
    }
}

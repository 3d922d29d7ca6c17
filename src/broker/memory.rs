use bytes::Bytes;
use chrono::Utc;
use kvfeed_protocol::{ConsumeResponse, Message, OffsetReset, ProduceAck};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::broker::offset_tracker::OffsetTracker;
use crate::broker::LogBroker;
use crate::core::error::BrokerError;

/// What a [`MemoryLog`] keeps. Count is enforced on every append; age and
/// idle groups are enforced by [`MemoryLog::cleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Records kept per partition.
    pub max_records: usize,

    /// Records older than this are dropped.
    pub max_age: Duration,

    /// A group that neither read nor committed for this long is forgotten.
    pub group_idle: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Retention {
            max_records: 100_000,
            max_age: Duration::from_secs(60 * 60),
            group_idle: Duration::from_secs(60 * 60),
        }
    }
}

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub records_dropped: usize,
    pub groups_expired: usize,
}

/// One partition's retained records. Offsets stay absolute: the record at
/// `records[i]` has offset `base_offset + i`.
#[derive(Default)]
struct Partition {
    base_offset: u64,
    records: VecDeque<Message>,
}

impl Partition {
    fn end_offset(&self) -> u64 {
        self.base_offset + self.records.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&Message> {
        let index = offset.checked_sub(self.base_offset)?;
        self.records.get(index as usize)
    }

    fn drop_front(&mut self, count: usize) -> usize {
        let count = count.min(self.records.len());
        self.records.drain(..count);
        self.base_offset += count as u64;
        count
    }
}

struct Topic {
    partitions: Vec<Partition>,
    next_partition: u32, // round robin for unkeyed records
}

impl Topic {
    fn new(partition_count: u32) -> Topic {
        Topic {
            partitions: (0..partition_count.max(1)).map(|_| Partition::default()).collect(),
            next_partition: 0,
        }
    }

    fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn pick_partition(&mut self, key: &[u8]) -> u32 {
        if key.is_empty() {
            let partition_id = self.next_partition;
            self.next_partition = (self.next_partition + 1) % self.partition_count();
            partition_id
        } else {
            (xxh3_64(key) % self.partition_count() as u64) as u32
        }
    }
}

#[derive(Default)]
struct LogState {
    topics: HashMap<String, Topic>,
    offsets: OffsetTracker,
}

/// Partitioned log held in process memory.
///
/// Share one instance (behind an `Arc`) between nodes to give them a common
/// log, or serve it to other processes with `server::broker_listener`.
/// Topics are created on first use.
pub struct MemoryLog {
    partition_count: u32,
    retention: Retention,
    state: Mutex<LogState>,
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

impl MemoryLog {
    pub fn new(partition_count: u32) -> Self {
        Self::with_retention(partition_count, Retention::default())
    }

    pub fn with_retention(partition_count: u32, retention: Retention) -> Self {
        MemoryLog {
            partition_count: partition_count.max(1),
            retention,
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    pub fn retention(&self) -> &Retention {
        &self.retention
    }

    /// Number of records `topic` currently retains, across partitions.
    pub async fn len(&self, topic: &str) -> usize {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|t| t.partitions.iter().map(|p| p.records.len()).sum())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, topic: &str) -> bool {
        self.len(topic).await == 0
    }

    /// Oldest retained offset of a partition; `None` for an unknown topic.
    pub async fn base_offset(&self, topic: &str, partition: u32) -> Option<u64> {
        let state = self.state.lock().await;
        let topic_log = state.topics.get(topic)?;
        topic_log
            .partitions
            .get(partition as usize)
            .map(|p| p.base_offset)
    }

    pub async fn committed(&self, topic: &str, partition: u32, group: &str) -> Option<u64> {
        self.state.lock().await.offsets.fetch(group, topic, partition)
    }

    /// Number of (group, topic) positions held.
    pub async fn group_count(&self) -> usize {
        self.state.lock().await.offsets.len()
    }

    pub async fn produce(&self, topic: &str, key: &[u8], payload: Bytes) -> ProduceAck {
        let mut state = self.state.lock().await;
        let partition_count = self.partition_count;
        let topic_log = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(partition_count));

        let partition = topic_log.pick_partition(key);
        let log = &mut topic_log.partitions[partition as usize];
        let offset = log.end_offset();
        log.records.push_back(Message {
            key: (!key.is_empty()).then(|| key.to_vec()),
            value: payload.to_vec(),
            timestamp: now_ms(),
        });
        let over = log.records.len().saturating_sub(self.retention.max_records.max(1));
        log.drop_front(over);
        debug!(topic, partition, offset, "record appended");

        ProduceAck { partition, offset }
    }

    pub async fn consume_with_group(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        reset: OffsetReset,
    ) -> Result<Option<ConsumeResponse>, BrokerError> {
        let mut state = self.state.lock().await;
        let partition_count = self.partition_count;
        let LogState { topics, offsets } = &mut *state;
        let topic_log = topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(partition_count));
        let log = topic_log
            .partitions
            .get(partition as usize)
            .ok_or_else(|| BrokerError::NoPartition {
                topic: topic.to_string(),
                partition,
            })?;

        let now = now_ms();
        let offset = match offsets.fetch(group, topic, partition) {
            Some(offset) => {
                offsets.touch(group, topic, now);
                offset
            }
            None => {
                let start = match reset {
                    OffsetReset::Earliest => log.base_offset,
                    OffsetReset::Latest => log.end_offset(),
                };
                // pin the start so later appends are not skipped
                offsets.commit(group, topic, partition, start, now);
                start
            }
        };

        let offset = if offset < log.base_offset {
            warn!(
                topic,
                partition,
                group,
                lost = log.base_offset - offset,
                "records expired before the group read them"
            );
            log.base_offset
        } else {
            offset
        };

        Ok(log.get(offset).map(|message| ConsumeResponse {
            offset,
            message: message.clone(),
        }))
    }

    pub async fn commit_offset(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        offset: u64,
    ) -> Result<(), BrokerError> {
        if partition >= self.partition_count {
            return Err(BrokerError::NoPartition {
                topic: topic.to_string(),
                partition,
            });
        }
        self.state
            .lock()
            .await
            .offsets
            .commit(group, topic, partition, offset, now_ms());
        Ok(())
    }

    /// Drops records past `max_age` and forgets groups idle past `group_idle`.
    pub async fn cleanup(&self) -> CleanupReport {
        self.cleanup_at(now_ms()).await
    }

    async fn cleanup_at(&self, now: u64) -> CleanupReport {
        let age_cutoff = now.saturating_sub(self.retention.max_age.as_millis() as u64);
        let idle_cutoff = now.saturating_sub(self.retention.group_idle.as_millis() as u64);

        let mut state = self.state.lock().await;
        let mut report = CleanupReport::default();
        for (name, topic_log) in state.topics.iter_mut() {
            for (partition, log) in topic_log.partitions.iter_mut().enumerate() {
                let expired = log
                    .records
                    .iter()
                    .take_while(|m| m.timestamp < age_cutoff)
                    .count();
                if expired > 0 {
                    log.drop_front(expired);
                    debug!(topic = %name, partition, expired, base_offset = log.base_offset, "records expired");
                }
                report.records_dropped += expired;
            }
        }
        report.groups_expired = state.offsets.expire_idle(idle_cutoff);

        if report != CleanupReport::default() {
            info!(
                records_dropped = report.records_dropped,
                groups_expired = report.groups_expired,
                "retention cleanup"
            );
        }
        report
    }
}

impl LogBroker for MemoryLog {
    async fn append(&self, topic: &str, key: &[u8], payload: Bytes) -> Result<ProduceAck, BrokerError> {
        Ok(self.produce(topic, key, payload).await)
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        reset: OffsetReset,
    ) -> Result<Option<ConsumeResponse>, BrokerError> {
        self.consume_with_group(topic, partition, group, reset).await
    }

    async fn partition_count(&self, _topic: &str) -> Result<u32, BrokerError> {
        Ok(self.partition_count)
    }

    async fn commit(&self, topic: &str, partition: u32, group: &str, offset: u64) -> Result<(), BrokerError> {
        self.commit_offset(topic, partition, group, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_always_lands_in_same_partition() {
        let log = MemoryLog::new(4);
        let first = log.produce("kvstore", b"x/k1", Bytes::from_static(b"1")).await;
        for i in 0..10 {
            let ack = log.produce("kvstore", b"x/k1", Bytes::from(format!("{}", i))).await;
            assert_eq!(ack.partition, first.partition);
        }
        assert_eq!(log.len("kvstore").await, 11);
    }

    #[tokio::test]
    async fn every_group_sees_every_record() {
        let log = MemoryLog::new(1);
        log.produce("kvstore", b"x/k", Bytes::from_static(b"a")).await;

        for group in ["kvfeed-a", "kvfeed-b"] {
            let got = log
                .consume_with_group("kvstore", 0, group, OffsetReset::Earliest)
                .await
                .unwrap()
                .expect("record for each group");
            assert_eq!(got.offset, 0);
            assert_eq!(got.message.value, b"a");
        }
    }

    #[tokio::test]
    async fn commit_advances_only_that_group() {
        let log = MemoryLog::new(1);
        log.produce("kvstore", b"x/k", Bytes::from_static(b"a")).await;
        log.produce("kvstore", b"x/k", Bytes::from_static(b"b")).await;

        log.consume_with_group("kvstore", 0, "g1", OffsetReset::Earliest).await.unwrap();
        log.commit_offset("kvstore", 0, "g1", 1).await.unwrap();

        let g1 = log
            .consume_with_group("kvstore", 0, "g1", OffsetReset::Earliest)
            .await
            .unwrap()
            .unwrap();
        let g2 = log
            .consume_with_group("kvstore", 0, "g2", OffsetReset::Earliest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(g1.message.value, b"b");
        assert_eq!(g2.message.value, b"a");
    }

    #[tokio::test]
    async fn latest_reset_starts_after_existing_records() {
        let log = MemoryLog::new(1);
        log.produce("kvstore", b"x/k", Bytes::from_static(b"old")).await;

        let none = log
            .consume_with_group("kvstore", 0, "late", OffsetReset::Latest)
            .await
            .unwrap();
        assert!(none.is_none());

        log.produce("kvstore", b"x/k", Bytes::from_static(b"new")).await;
        let got = log
            .consume_with_group("kvstore", 0, "late", OffsetReset::Latest)
            .await
            .unwrap()
            .expect("record appended after the group joined");
        assert_eq!(got.offset, 1);
        assert_eq!(got.message.value, b"new");
    }

    #[tokio::test]
    async fn unknown_partition_is_an_error() {
        let log = MemoryLog::new(2);
        let err = log
            .consume_with_group("kvstore", 5, "g", OffsetReset::Earliest)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NoPartition { partition: 5, .. }));
        assert!(log.commit_offset("kvstore", 2, "g", 0).await.is_err());
    }

    #[tokio::test]
    async fn count_bound_keeps_offsets_absolute() {
        let log = MemoryLog::with_retention(
            1,
            Retention {
                max_records: 3,
                ..Retention::default()
            },
        );
        for i in 0..5 {
            let ack = log.produce("kvstore", b"x/k", Bytes::from(format!("{}", i))).await;
            assert_eq!(ack.offset, i);
        }
        assert_eq!(log.len("kvstore").await, 3);
        assert_eq!(log.base_offset("kvstore", 0).await, Some(2));

        let first = log
            .consume_with_group("kvstore", 0, "g", OffsetReset::Earliest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((first.offset, first.message.value.as_slice()), (2, &b"2"[..]));

        // a group left behind the retained range resumes at the oldest record
        log.commit_offset("kvstore", 0, "slow", 1).await.unwrap();
        let resumed = log
            .consume_with_group("kvstore", 0, "slow", OffsetReset::Earliest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.offset, 2);
    }

    #[tokio::test]
    async fn cleanup_drops_old_records_and_idle_groups() {
        let log = MemoryLog::with_retention(
            1,
            Retention {
                max_records: 100,
                max_age: Duration::from_secs(60),
                group_idle: Duration::from_secs(600),
            },
        );
        log.produce("kvstore", b"x/k", Bytes::from_static(b"a")).await;
        log.produce("kvstore", b"x/k", Bytes::from_static(b"b")).await;
        log.commit_offset("kvstore", 0, "kvfeed-restarted", 1).await.unwrap();

        let nothing = log.cleanup().await;
        assert_eq!(nothing, CleanupReport::default());

        let later = now_ms() + 120_000;
        let report = log.cleanup_at(later).await;
        assert_eq!(report.records_dropped, 2);
        assert_eq!(report.groups_expired, 0);
        assert!(log.is_empty("kvstore").await);
        assert_eq!(log.base_offset("kvstore", 0).await, Some(2));

        let appended = log.produce("kvstore", b"x/k", Bytes::from_static(b"c")).await;
        assert_eq!(appended.offset, 2);

        let report = log.cleanup_at(now_ms() + 1_200_000).await;
        assert_eq!(report.groups_expired, 1);
        assert_eq!(log.group_count().await, 0);
    }
}

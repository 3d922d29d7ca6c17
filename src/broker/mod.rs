//! The shared, partitioned log announcements travel through.

use bytes::Bytes;
use kvfeed_protocol::{ConsumeResponse, OffsetReset, ProduceAck};
use std::future::Future;

use crate::core::error::BrokerError;

pub mod memory;
mod offset_tracker;
pub mod remote;

pub use memory::{CleanupReport, MemoryLog, Retention};
pub use remote::RemoteBroker;

/// Append/read/commit on a partitioned log with consumer-group offsets.
///
/// Every group keeps its own position per partition, so two groups reading
/// the same topic each see every record.
pub trait LogBroker: Send + Sync + 'static {
    /// Appends `payload`; records sharing `key` land in the same partition.
    fn append(
        &self,
        topic: &str,
        key: &[u8],
        payload: Bytes,
    ) -> impl Future<Output = Result<ProduceAck, BrokerError>> + Send;

    /// Next record at `group`'s committed position, or `None` when caught up.
    /// A group without a position starts where `reset` says.
    fn fetch(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        reset: OffsetReset,
    ) -> impl Future<Output = Result<Option<ConsumeResponse>, BrokerError>> + Send;

    /// Number of partitions `topic` has on this broker. Readers must cover
    /// `0..partition_count`, whatever their own configuration says.
    fn partition_count(&self, topic: &str) -> impl Future<Output = Result<u32, BrokerError>> + Send;

    /// Stores `offset` as the next position `group` reads from.
    fn commit(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        offset: u64,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

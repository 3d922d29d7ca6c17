use kvfeed_protocol::{MalformedAnnouncement, ProtocolError};
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::core::connection::ConnectionId;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Partition {partition} does not exist in topic {topic}")]
    NoPartition { topic: String, partition: u32 },

    #[error("Broker unreachable: {0}")]
    Io(#[from] io::Error),

    #[error("Broker protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Broker rejected request: {0}")]
    Rejected(String),
}

/// Appending an announcement failed. Never affects the storage write.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("publisher task is no longer running")]
    Closed,

    #[error("invalid mutation: {0}")]
    InvalidRecord(String),

    #[error("announcement could not be encoded: {0}")]
    Encode(ProtocolError),
}

/// Reading or committing on the log failed; the consumer loop backs off.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("partition count lookup failed: {0}")]
    Metadata(BrokerError),

    #[error("read from partition {partition} failed: {source}")]
    Read { partition: u32, source: BrokerError },

    #[error("commit of offset {offset} on partition {partition} failed: {source}")]
    Commit {
        partition: u32,
        offset: u64,
        source: BrokerError,
    },
}

/// A record was read but could not be decoded; it is skipped.
#[derive(Debug, Error)]
#[error("malformed announcement at partition {partition} offset {offset}: {source}")]
pub struct SkippedAnnouncement {
    pub partition: u32,
    pub offset: u64,
    pub source: MalformedAnnouncement,
}

/// A push to one connection did not go through.
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("connection {0} outbound queue is full")]
    QueueFull(ConnectionId),

    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

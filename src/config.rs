use anyhow::{Context, Result};
use kvfeed_protocol::OffsetReset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::broker::Retention;

/// Per-node knobs. Every field has a default, so a TOML file only needs the
/// fields it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Must be unique per node: it names this node's consumer group, and two
    /// nodes sharing a group would split announcements between them instead
    /// of each receiving all of them.
    pub node_id: String,

    /// Topic every node publishes to and reads from.
    pub topic: String,

    /// Partition count of the private in-memory log a node runs on when no
    /// broker is given. On a shared broker the consumer loop reads the count
    /// from the broker instead.
    pub partitions: u32,

    /// Idle time between passes once every partition is drained.
    pub poll_interval: Duration,

    /// First sleep after a broker error.
    pub backoff_initial: Duration,

    /// Backoff doubles per consecutive error up to this cap.
    pub backoff_max: Duration,

    /// Upper bound on one publish, and on one broker request.
    pub publish_timeout: Duration,

    /// Pushes buffered per connection before further pushes fail.
    pub outbound_queue: usize,

    /// Start position of a consumer group that has never committed.
    pub offset_reset: OffsetReset,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            topic: "kvstore".to_string(),
            partitions: 3,
            poll_interval: Duration::from_millis(50),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(1),
            publish_timeout: Duration::from_secs(5),
            outbound_queue: 256,
            offset_reset: OffsetReset::Latest,
        }
    }
}

fn default_node_id() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    )
}

impl NodeConfig {
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => Self::read_from_file(p),
            None => Ok(Self::default()),
        }
    }

    fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {:?}", path.as_ref()))?;
        let cfg: NodeConfig = toml::from_str(&raw).with_context(|| "parsing node config TOML")?;
        Ok(cfg)
    }

    pub fn consumer_group(&self) -> String {
        format!("kvfeed-{}", self.node_id)
    }
}

/// Knobs for a process that owns a `MemoryLog`: `kvfeed broker`, or a node
/// running without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub partitions: u32,

    /// Records kept per partition; older ones are dropped on append.
    pub retention_records: usize,

    /// Records older than this are dropped by the cleanup task.
    pub retention_age: Duration,

    /// Consumer groups silent this long are forgotten.
    pub group_idle: Duration,

    pub cleanup_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let retention = Retention::default();
        Self {
            partitions: 3,
            retention_records: retention.max_records,
            retention_age: retention.max_age,
            group_idle: retention.group_idle,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl BrokerConfig {
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {:?}", path.as_ref()))?;
        toml::from_str(&raw).with_context(|| "parsing broker config TOML")
    }

    pub fn retention(&self) -> Retention {
        Retention {
            max_records: self.retention_records,
            max_age: self.retention_age,
            group_idle: self.group_idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node_id = \"node-b\"\npartitions = 6\noffset_reset = \"earliest\"").unwrap();

        let cfg = NodeConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(cfg.node_id, "node-b");
        assert_eq!(cfg.partitions, 6);
        assert_eq!(cfg.offset_reset, OffsetReset::Earliest);
        assert_eq!(cfg.topic, "kvstore");
        assert_eq!(cfg.backoff_initial, Duration::from_secs(1));
        assert_eq!(cfg.consumer_group(), "kvfeed-node-b");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = NodeConfig::load_or_default(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("reading"));
    }

    #[test]
    fn default_config_generates_node_id() {
        let cfg = NodeConfig::load_or_default::<&str>(None).unwrap();
        assert!(!cfg.node_id.is_empty());
        assert!(cfg.consumer_group().starts_with("kvfeed-"));
    }

    #[test]
    fn broker_file_sets_retention() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "partitions = 8\nretention_records = 500\n[group_idle]\nsecs = 120\nnanos = 0"
        )
        .unwrap();

        let cfg = BrokerConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(cfg.partitions, 8);
        let retention = cfg.retention();
        assert_eq!(retention.max_records, 500);
        assert_eq!(retention.group_idle, Duration::from_secs(120));
        assert_eq!(retention.max_age, Retention::default().max_age);
        assert_eq!(cfg.cleanup_interval, Duration::from_secs(60));
    }
}

use kvfeed_protocol::{announcement, ConsumeResponse, OffsetReset};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch::Receiver;
use tracing::{debug, info, warn};

use crate::broker::LogBroker;
use crate::config::NodeConfig;
use crate::core::error::{ConsumeError, SkippedAnnouncement};
use crate::core::fanout::FanoutEngine;

/// Counters a running consumer loop updates.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    delivered: AtomicU64,
    pushes: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl ConsumerStats {
    /// Announcements decoded and fanned out.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Pushes accepted by client queues, summed over all announcements.
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    /// Records skipped as malformed.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Broker errors that sent the loop into backoff.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Reading,
    Backoff(Duration),
}

/// Reads this node's consumer-group position on every partition and fans
/// each announcement out before reading further.
///
/// Records are committed only after their fan-out, so a crash or a failed
/// commit replays them (at-least-once). One record per partition per pass;
/// records within a partition are handled strictly in log order. The set of
/// partitions is whatever the broker reports at the start of each pass.
pub struct ConsumerLoop<B> {
    broker: Arc<B>,
    fanout: FanoutEngine,
    topic: String,
    group: String,
    partitions: AtomicU32,
    reset: OffsetReset,
    poll_interval: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,
    stats: Arc<ConsumerStats>,
}

impl<B: LogBroker> ConsumerLoop<B> {
    pub fn new(config: &NodeConfig, broker: Arc<B>, fanout: FanoutEngine) -> Self {
        ConsumerLoop {
            broker,
            fanout,
            topic: config.topic.clone(),
            group: config.consumer_group(),
            partitions: AtomicU32::new(0),
            reset: config.offset_reset,
            poll_interval: config.poll_interval,
            backoff_initial: config.backoff_initial,
            backoff_max: config.backoff_max.max(config.backoff_initial),
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until `shutdown_rx` fires or its sender is dropped. Shutdown is
    /// observed between passes and during sleeps, never mid-request.
    pub async fn run(self, mut shutdown_rx: Receiver<()>) {
        info!(topic = %self.topic, group = %self.group, "consumer loop started");
        let mut state = LoopState::Reading;
        let mut next_backoff = self.backoff_initial;

        loop {
            if !matches!(shutdown_rx.has_changed(), Ok(false)) {
                break;
            }

            match state {
                LoopState::Reading => match self.poll_once().await {
                    Ok(0) => {
                        if pause(self.poll_interval, &mut shutdown_rx).await {
                            break;
                        }
                    }
                    Ok(_) => next_backoff = self.backoff_initial,
                    Err(e) => {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, retry_in = ?next_backoff, "error reading announcements");
                        state = LoopState::Backoff(next_backoff);
                        next_backoff = (next_backoff * 2).min(self.backoff_max);
                    }
                },
                LoopState::Backoff(delay) => {
                    if pause(delay, &mut shutdown_rx).await {
                        break;
                    }
                    state = LoopState::Reading;
                }
            }
        }
        info!(group = %self.group, "consumer loop stopped");
    }

    /// One pass over every partition. Returns how many records it handled.
    pub async fn poll_once(&self) -> Result<usize, ConsumeError> {
        let partitions = self
            .broker
            .partition_count(&self.topic)
            .await
            .map_err(ConsumeError::Metadata)?;
        let previous = self.partitions.swap(partitions, Ordering::Relaxed);
        if previous != partitions {
            info!(topic = %self.topic, partitions, previous, "partition layout");
        }

        let mut handled = 0;
        for partition in 0..partitions {
            let fetched = self
                .broker
                .fetch(&self.topic, partition, &self.group, self.reset)
                .await
                .map_err(|source| ConsumeError::Read { partition, source })?;
            let Some(record) = fetched else {
                continue;
            };

            let offset = record.offset;
            self.handle(partition, record).await;
            self.broker
                .commit(&self.topic, partition, &self.group, offset + 1)
                .await
                .map_err(|source| ConsumeError::Commit {
                    partition,
                    offset,
                    source,
                })?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn handle(&self, partition: u32, record: ConsumeResponse) {
        match announcement::decode(&record.message.value) {
            Ok(mutation) => {
                let report = self.fanout.deliver(&mutation).await;
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                self.stats.pushes.fetch_add(report.delivered as u64, Ordering::Relaxed);
                debug!(partition, offset = record.offset, attempted = report.attempted, "announcement handled");
            }
            Err(source) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                let skipped = SkippedAnnouncement {
                    partition,
                    offset: record.offset,
                    source,
                };
                warn!(error = %skipped, "skipping announcement");
            }
        }
    }
}

/// Sleeps for `delay`; returns `true` if shutdown was requested meanwhile.
async fn pause(delay: Duration, shutdown_rx: &mut Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown_rx.changed() => true,
    }
}

#![allow(dead_code)]

use kvfeed::broker::LogBroker;
use kvfeed::core::registry::SubscriptionRegistry;
use kvfeed::{Node, NodeConfig};
use kvfeed_client::{FeedClient, ServerEvent};
use kvfeed_protocol::OffsetReset;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Fast timings so tests do not sit in poll or backoff sleeps.
pub fn test_config(node_id: &str) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        partitions: 3,
        poll_interval: Duration::from_millis(5),
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
        publish_timeout: Duration::from_secs(2),
        offset_reset: OffsetReset::Earliest,
        ..NodeConfig::default()
    }
}

pub async fn start_node<B: LogBroker>(node_id: &str, broker: Arc<B>) -> Node<B> {
    Node::start(test_config(node_id), broker, "127.0.0.1:0")
        .await
        .expect("node starts")
}

pub async fn connect<B: LogBroker>(node: &Node<B>) -> FeedClient {
    FeedClient::connect(&node.local_addr().to_string())
        .await
        .expect("client connects")
}

/// Polls `check` until it holds or [`WAIT`] runs out.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Control events are unacknowledged; wait until the node has applied them.
pub async fn wait_for_subscriptions(registry: &Arc<SubscriptionRegistry>, count: usize) {
    eventually("subscriptions", || async move { registry.subscription_count().await == count }).await;
}

pub async fn next_event(client: &mut FeedClient) -> ServerEvent {
    tokio::time::timeout(WAIT, client.next_event())
        .await
        .expect("push within deadline")
        .expect("valid push frame")
        .expect("connection still open")
}

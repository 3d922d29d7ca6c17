/*
Background work a running node owns.

The consumer loop turns the shared log into pushes for this node's clients;
it stops when the node's shutdown channel fires. A process that owns a
`MemoryLog` also runs the retention task against it.
*/
use std::sync::Arc;
use tokio::sync::watch::Receiver;
use tokio::task::JoinHandle;

use crate::broker::LogBroker;

pub mod consumer;
pub mod retention;

pub use consumer::{ConsumerLoop, ConsumerStats};
pub use retention::run_periodic_cleanup;

pub fn run<B: LogBroker>(consumer: ConsumerLoop<B>, shutdown_rx: Receiver<()>) -> (Arc<ConsumerStats>, JoinHandle<()>) {
    let stats = consumer.stats();
    let task = tokio::spawn(consumer.run(shutdown_rx));
    (stats, task)
}

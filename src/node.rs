use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::LogBroker;
use crate::config::NodeConfig;
use crate::core::fanout::FanoutEngine;
use crate::core::lifecycle::ConnectionLifecycle;
use crate::core::publisher::Publisher;
use crate::core::registry::SubscriptionRegistry;
use crate::runtime::{self, ConsumerLoop, ConsumerStats};
use crate::server::listener;

/// One running node: a client listener, a consumer loop on this node's
/// group, and a publisher for the local write path.
pub struct Node<B> {
    local_addr: SocketAddr,
    config: NodeConfig,
    publisher: Publisher<B>,
    registry: Arc<SubscriptionRegistry>,
    stats: Arc<ConsumerStats>,
    shutdown_tx: watch::Sender<()>,
    consumer_task: JoinHandle<()>,
    listener_task: JoinHandle<Result<()>>,
}

impl<B: LogBroker> Node<B> {
    pub async fn start(config: NodeConfig, broker: Arc<B>, addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind client listener")?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let registry = Arc::new(SubscriptionRegistry::new());

        let publisher = Publisher::spawn(Arc::clone(&broker), config.topic.clone(), config.publish_timeout);
        let consumer = ConsumerLoop::new(&config, broker, FanoutEngine::new(Arc::clone(&registry)));
        let (stats, consumer_task) = runtime::run(consumer, shutdown_rx.clone());

        let lifecycle = Arc::new(ConnectionLifecycle::new(Arc::clone(&registry), config.outbound_queue));
        let listener_task = tokio::spawn(listener::serve(listener, lifecycle, shutdown_rx));

        info!(node_id = %config.node_id, group = %config.consumer_group(), %local_addr, "node started");
        Ok(Node {
            local_addr,
            config,
            publisher,
            registry,
            stats,
            shutdown_tx,
            consumer_task,
            listener_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Handle for the write path; clone it freely.
    pub fn publisher(&self) -> &Publisher<B> {
        &self.publisher
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<ConsumerStats> {
        &self.stats
    }

    /// Stops accepting clients and stops the consumer loop, then waits for both.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.consumer_task.await {
            warn!(error = %e, "consumer task ended abnormally");
        }
        self.listener_task.await.context("client listener task")??;
        info!(node_id = %self.config.node_id, "node stopped");
        Ok(())
    }
}

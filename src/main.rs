use anyhow::{Context, Result};
use clap::Parser;
use kvfeed::broker::{LogBroker, MemoryLog, RemoteBroker};
use kvfeed::server::params::{Command, Params};
use kvfeed::server::{self, broker_listener};
use kvfeed::runtime::run_periodic_cleanup;
use kvfeed::{BrokerConfig, Node, NodeConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    server::init_tracing();
    let params = Params::parse();

    match params.command {
        Command::Broker {
            port,
            partitions,
            config,
        } => {
            let mut config = BrokerConfig::load_or_default(config.as_ref())?;
            if let Some(partitions) = partitions {
                config.partitions = partitions;
            }
            info!("kvfeed broker starting with config: {:?}", config);
            run_broker(port, config).await
        }
        Command::Node {
            port,
            broker,
            node_id,
            config,
        } => {
            let mut config = NodeConfig::load_or_default(config.as_ref())?;
            if let Some(node_id) = node_id {
                config.node_id = node_id;
            }
            info!("kvfeed node starting with config: {:?}", config);

            let addr = format!("0.0.0.0:{}", port);
            match broker {
                Some(broker_addr) => {
                    let remote = RemoteBroker::new(broker_addr, config.publish_timeout);
                    run_node(config, Arc::new(remote), addr).await
                }
                None => {
                    let broker_config = BrokerConfig {
                        partitions: config.partitions,
                        ..BrokerConfig::default()
                    };
                    let log = Arc::new(MemoryLog::with_retention(
                        broker_config.partitions,
                        broker_config.retention(),
                    ));
                    let (cleanup_tx, cleanup_rx) = watch::channel(());
                    let cleanup = tokio::spawn(run_periodic_cleanup(
                        Arc::clone(&log),
                        cleanup_rx,
                        broker_config.cleanup_interval,
                    ));
                    let result = run_node(config, log, addr).await;
                    let _ = cleanup_tx.send(());
                    cleanup.await.context("retention task")?;
                    result
                }
            }
        }
    }
}

async fn run_node<B: LogBroker>(config: NodeConfig, broker: Arc<B>, addr: String) -> Result<()> {
    let node = Node::start(config, broker, addr).await?;
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    node.shutdown().await
}

async fn run_broker(port: u16, config: BrokerConfig) -> Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind TCP listener")?;
    let log = Arc::new(MemoryLog::with_retention(config.partitions, config.retention()));
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let cleanup = tokio::spawn(run_periodic_cleanup(
        Arc::clone(&log),
        shutdown_rx.clone(),
        config.cleanup_interval,
    ));
    let serving = tokio::spawn(broker_listener::serve(listener, log, shutdown_rx));
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(());
    cleanup.await.context("retention task")?;
    serving.await.context("broker listener task")?
}

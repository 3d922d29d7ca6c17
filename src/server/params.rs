use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kvfeed")]
pub struct Params {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve an in-memory log over the broker RPC.
    Broker {
        #[arg(long, env = "KVFEED_BROKER_PORT", default_value_t = 9092)]
        port: u16,

        /// Overrides `partitions` from the config file.
        #[arg(long, env = "KVFEED_PARTITIONS")]
        partitions: Option<u32>,

        #[arg(long, env = "KVFEED_BROKER_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Run a node: accept subscribers and relay announcements to them.
    Node {
        #[arg(long, env = "KVFEED_PORT", default_value_t = 7070)]
        port: u16,

        /// Broker address; without one the node runs on a private in-memory log.
        #[arg(long, env = "KVFEED_BROKER")]
        broker: Option<String>,

        #[arg(long, env = "KVFEED_NODE_ID")]
        node_id: Option<String>,

        #[arg(long, env = "KVFEED_CONFIG")]
        config: Option<PathBuf>,
    },
}

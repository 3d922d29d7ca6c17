pub mod broker;
pub mod config;
pub mod core;
pub mod node;
pub mod runtime;
pub mod server;

pub use config::{BrokerConfig, NodeConfig};
pub use node::Node;

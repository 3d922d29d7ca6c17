pub mod client;

pub use client::FeedClient;
pub use kvfeed_protocol::{ClientEvent, KeyValue, ServerEvent};

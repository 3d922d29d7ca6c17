pub mod connection;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod publisher;
pub mod registry;

mod consume_response;
mod metadata_response;
mod produce_ack;

pub use consume_response::ConsumeResponse;
pub use metadata_response::MetadataResponse;
pub use produce_ack::ProduceAck;

mod commit_offset;
mod consume_with_group;
mod metadata;
mod produce;

pub use commit_offset::CommitOffsetRequest;
pub use consume_with_group::{ConsumeWithGroupRequest, OffsetReset};
pub use metadata::MetadataRequest;
pub use produce::ProduceRequest;

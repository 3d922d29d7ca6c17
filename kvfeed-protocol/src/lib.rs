pub mod announcement;
pub mod errors;
pub mod event;
pub mod frame;
pub mod message;
pub mod payload;
mod op_code;
mod request;
mod response;
mod utils;

// Public re-exports for easy access
pub use announcement::{KeyValue, MutationKind, MutationRecord};
pub use errors::{DeserializeError, MalformedAnnouncement, ProtocolError};
pub use event::{ClientEvent, ServerEvent};
pub use frame::{Frame, FrameType};
pub use message::Message;
pub use payload::{RequestPayload, ResponsePayload};

pub use request::{
    CommitOffsetRequest, ConsumeWithGroupRequest, MetadataRequest, OffsetReset, ProduceRequest,
};
pub use response::{ConsumeResponse, MetadataResponse, ProduceAck};

pub use op_code::OpCode;

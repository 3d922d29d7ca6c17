use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown opcode: {0}")]
    UnknownOpCode(u8),

    #[error("Incomplete frame")]
    IncompleteFrame,

    #[error("Payload decode error: {0}")]
    PayloadError(String),

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("Unexpected frame type: {0:?}")]
    UnexpectedFrameType(crate::FrameType),

    #[error("Checksum Mismatch expected: {expected} found: {found} ")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("Frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("IoError :{0} ")]
    IoError(#[from] io::Error),

    #[error("Message deserialize error: {0}")]
    MessageDeserializeError(#[from] DeserializeError),

    #[error("Event encoding error: {0}")]
    EventError(#[from] serde_json::Error),

    #[error("Remote error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("Unexpected end of input")]
    UnexpectedEOF,

    #[error("Invalid UTF-8 in message")]
    InvalidUtf8,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// An announcement read off the log that cannot be turned into a mutation.
#[derive(Debug, Error)]
pub enum MalformedAnnouncement {
    #[error("announcement is not a valid envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("announcement has an empty app_id or key")]
    EmptyIdentity,

    #[error("{kind} announcement for {app_id}/{key} carries no value")]
    MissingValue {
        kind: crate::MutationKind,
        app_id: String,
        key: String,
    },

    #[error("value for {found_app_id}/{found_key} does not match envelope {app_id}/{key}")]
    IdentityMismatch {
        app_id: String,
        key: String,
        found_app_id: String,
        found_key: String,
    },
}

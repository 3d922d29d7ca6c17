use crate::utils::{get_string, put_prefixed};
use crate::ProtocolError;
use bytes::{Bytes, BytesMut};

/// Asks the broker how a topic is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    pub topic: String,
}

//frame: [u32 topic_len][topic bytes]

impl MetadataRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.topic.len());
        put_prefixed(&mut buf, self.topic.as_bytes());
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let topic = get_string(&mut buf, "topic")?;
        Ok(Self { topic })
    }
}

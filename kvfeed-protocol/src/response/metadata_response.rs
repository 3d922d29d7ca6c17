use crate::utils::{get_string, get_u32, put_prefixed};
use crate::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// Partition layout of one topic as the broker holds it. Readers take the
/// partition count from here, never from their own configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub topic: String,
    pub partition_count: u32,
}

impl MetadataResponse {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8 + self.topic.len());
        put_prefixed(&mut buf, self.topic.as_bytes());
        buf.put_u32(self.partition_count);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let topic = get_string(&mut buf, "topic")?;
        let partition_count = get_u32(&mut buf, "partition_count")?;
        if partition_count == 0 {
            return Err(ProtocolError::PayloadError(format!("topic {} reports no partitions", topic)));
        }
        Ok(Self { topic, partition_count })
    }
}

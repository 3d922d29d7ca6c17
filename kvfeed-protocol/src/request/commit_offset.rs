use crate::utils::{get_string, get_u32, get_u64, put_prefixed};
use crate::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone)]
pub struct CommitOffsetRequest {
    pub topic: String,
    pub partition: u32,
    pub group: String,
    /// Next offset the group will read.
    pub offset: u64,
}

//frame: [u32 topic_len][topic bytes][u32 partition][u32 group_len][group bytes][u64 offset]

impl CommitOffsetRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_prefixed(&mut buf, self.topic.as_bytes());
        buf.put_u32(self.partition);
        put_prefixed(&mut buf, self.group.as_bytes());
        buf.put_u64(self.offset);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let topic = get_string(&mut buf, "topic")?;
        let partition = get_u32(&mut buf, "partition")?;
        let group = get_string(&mut buf, "group")?;
        let offset = get_u64(&mut buf, "offset")?;

        Ok(Self {
            topic,
            partition,
            group,
            offset,
        })
    }
}

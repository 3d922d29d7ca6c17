use crate::utils::{get_prefixed, get_string, put_prefixed};
use crate::ProtocolError;
use bytes::{Bytes, BytesMut};

/// frame: [u32 topic_len][topic][u32 key_len][key][u32 message_len][message]
///
/// The broker picks the partition from `key`, so every record sharing a key
/// lands in the same partition.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub topic: String,
    pub key: Bytes,
    pub message: Bytes,
}

impl ProduceRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(12 + self.topic.len() + self.key.len() + self.message.len());
        put_prefixed(&mut buf, self.topic.as_bytes());
        put_prefixed(&mut buf, &self.key);
        put_prefixed(&mut buf, &self.message);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let topic = get_string(&mut buf, "topic")?;
        let key = get_prefixed(&mut buf, "key")?;
        let message = get_prefixed(&mut buf, "message")?;
        Ok(ProduceRequest { topic, key, message })
    }
}

use crate::errors::ProtocolError;
use crate::message::Message;
use bytes::Bytes;

/// An empty response body means the group has nothing new in that partition.
#[derive(Debug, Clone)]
pub struct ConsumeResponse {
    pub offset: u64,
    pub message: Message,
}

impl ConsumeResponse {
    pub fn serialize(&self) -> Bytes {
        self.message.serialize(self.offset)
    }

    pub fn deserialize(buf: Bytes) -> Result<Option<Self>, ProtocolError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let (offset, message) = Message::deserialize(&buf)?;
        Ok(Some(ConsumeResponse { offset, message }))
    }
}

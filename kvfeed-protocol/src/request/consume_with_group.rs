use crate::utils::{get_string, get_u32, put_prefixed};
use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Where a group with no committed offset starts reading a partition.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest = 0,
    #[default]
    Latest = 1,
}

impl TryFrom<u8> for OffsetReset {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(OffsetReset::Earliest),
            1 => Ok(OffsetReset::Latest),
            _ => Err(ProtocolError::PayloadError(format!("Unknown offset reset {}", value))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumeWithGroupRequest {
    pub topic: String,
    pub partition: u32,
    pub group: String,
    pub reset: OffsetReset,
}

/*
frame: [u32 topic_len][topic bytes][u32 partition][u32 group_len][group bytes][u8 reset]
*/
impl ConsumeWithGroupRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_prefixed(&mut buf, self.topic.as_bytes());
        buf.put_u32(self.partition);
        put_prefixed(&mut buf, self.group.as_bytes());
        buf.put_u8(self.reset as u8);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let topic = get_string(&mut buf, "topic")?;
        let partition = get_u32(&mut buf, "partition")?;
        let group = get_string(&mut buf, "group")?;
        if buf.remaining() < 1 {
            return Err(ProtocolError::PayloadError("Missing offset reset".into()));
        }
        let reset = OffsetReset::try_from(buf.get_u8())?;

        Ok(ConsumeWithGroupRequest {
            topic,
            partition,
            group,
            reset,
        })
    }
}

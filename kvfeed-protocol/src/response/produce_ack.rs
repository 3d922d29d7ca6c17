use crate::utils::{get_u32, get_u64};
use crate::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Where the broker stored an appended record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceAck {
    pub partition: u32,
    pub offset: u64,
}

//frame: [u32 partition][u64 offset]

impl ProduceAck {
    const WIRE_LEN: usize = 12;

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_LEN);
        buf.put_u32(self.partition);
        buf.put_u64(self.offset);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let partition = get_u32(&mut buf, "partition")?;
        let offset = get_u64(&mut buf, "offset")?;
        if !buf.is_empty() {
            return Err(ProtocolError::PayloadError(format!(
                "{} trailing bytes after produce ack",
                buf.len()
            )));
        }
        Ok(ProduceAck { partition, offset })
    }
}

impl fmt::Display for ProduceAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_padded_acks_are_rejected() {
        let wire = ProduceAck { partition: 2, offset: 41 }.serialize();
        assert_eq!(wire.len(), ProduceAck::WIRE_LEN);
        assert!(ProduceAck::deserialize(wire.slice(..8)).is_err());

        let mut padded = BytesMut::from(&wire[..]);
        padded.put_u8(0);
        assert!(ProduceAck::deserialize(padded.freeze()).is_err());

        let ack = ProduceAck::deserialize(wire).unwrap();
        assert_eq!(ack.to_string(), "2@41");
    }
}

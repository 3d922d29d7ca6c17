/*
[ version: u8 ]
[ frame_type: u8 ]
[ correlation_id: u32 ]
[ payload_len: u32 ]
[ checksum : u32 ]      xxh32 of the payload
[ payload bytes... ]

Broker RPC uses Request/Response/Error, client sessions use Control/Push.
*/

use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use xxhash_rust::xxh32::xxh32;

pub const FRAME_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 14;
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameType {
    Request = 1,
    Response = 2,
    Error = 3,
    Control = 4, // client -> node
    Push = 5,    // node -> client
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(FrameType::Request),
            2 => Ok(FrameType::Response),
            3 => Ok(FrameType::Error),
            4 => Ok(FrameType::Control),
            5 => Ok(FrameType::Push),
            _ => Err(ProtocolError::UnknownFrameType(value)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u8,
    pub frame_type: FrameType,
    pub correlation_id: u32, // 0 for control/push traffic
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, correlation_id: u32, payload: impl Into<Bytes>) -> Frame {
        Frame {
            version: FRAME_VERSION,
            frame_type,
            correlation_id,
            payload: payload.into(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.put_u8(self.version);
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.correlation_id);
        buf.put_u32(self.payload.len() as u32);
        buf.put_u32(xxh32(&self.payload, 0));
        buf.extend_from_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Pulls one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the frame is still
    /// partial, so callers can keep reading into the same buffer.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut cursor = &buf[..];
        let version = cursor.get_u8();
        let frame_type_raw = cursor.get_u8();
        let correlation_id = cursor.get_u32();
        let payload_len = cursor.get_u32() as usize;
        let checksum_expected = cursor.get_u32();

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        if cursor.remaining() < payload_len {
            return Ok(None);
        }

        buf.advance(HEADER_LEN);
        let payload = buf.split_to(payload_len).freeze();
        let checksum_actual = xxh32(&payload, 0);
        if checksum_actual != checksum_expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected: checksum_expected,
                found: checksum_actual,
            });
        }

        Ok(Some(Frame {
            version,
            frame_type: FrameType::try_from(frame_type_raw)?,
            correlation_id,
            payload,
        }))
    }
}

use crate::errors::ProtocolError;
use crate::op_code::OpCode;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// `[op_code: u8][data...]`, the body of a Request frame.
#[derive(Debug)]
pub struct RequestPayload {
    pub op_code: OpCode,
    pub data: Bytes,
}

/// Same layout as [`RequestPayload`], carried in a Response frame.
#[derive(Debug)]
pub struct ResponsePayload {
    pub op_code: OpCode,
    pub data: Bytes,
}

fn write_tagged(op_code: OpCode, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + data.len());
    buf.put_u8(op_code as u8);
    buf.extend_from_slice(data);
    buf.freeze()
}

fn read_tagged(mut buf: Bytes, what: &str) -> Result<(OpCode, Bytes), ProtocolError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::PayloadError(format!("Empty {} payload", what)));
    }
    let op_code = OpCode::try_from(buf.get_u8())?;
    Ok((op_code, buf))
}

impl RequestPayload {
    pub fn serialize(&self) -> Bytes {
        write_tagged(self.op_code, &self.data)
    }

    pub fn deserialize(buf: Bytes) -> Result<Self, ProtocolError> {
        let (op_code, data) = read_tagged(buf, "request")?;
        Ok(RequestPayload { op_code, data })
    }
}

impl ResponsePayload {
    pub fn serialize(&self) -> Bytes {
        write_tagged(self.op_code, &self.data)
    }

    pub fn deserialize(buf: Bytes) -> Result<Self, ProtocolError> {
        let (op_code, data) = read_tagged(buf, "response")?;
        Ok(ResponsePayload { op_code, data })
    }

    /// Fails with `UnknownOpCode` when the broker answered a different request.
    pub fn expect_op(self, op_code: OpCode) -> Result<Bytes, ProtocolError> {
        if self.op_code != op_code {
            return Err(ProtocolError::UnknownOpCode(self.op_code as u8));
        }
        Ok(self.data)
    }
}

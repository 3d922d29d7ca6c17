use crate::errors::{DeserializeError, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub fn read_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], DeserializeError> {
    if buf.len() < len {
        return Err(DeserializeError::UnexpectedEOF);
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

/// Writes `[u32 len][bytes]`.
pub fn put_prefixed(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.extend_from_slice(data);
}

/// Reads a `[u32 len][bytes]` field, naming `field` in the error when short.
pub fn get_prefixed(buf: &mut Bytes, field: &str) -> Result<Bytes, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::PayloadError(format!(
            "Insufficient data for {} length",
            field
        )));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::PayloadError(format!(
            "Buffer too short for {}",
            field
        )));
    }
    Ok(buf.split_to(len))
}

pub fn get_string(buf: &mut Bytes, field: &str) -> Result<String, ProtocolError> {
    let raw = get_prefixed(buf, field)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| ProtocolError::PayloadError(format!("Invalid UTF-8 in {}", field)))
}

pub fn get_u32(buf: &mut Bytes, field: &str) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::PayloadError(format!("Missing {}", field)));
    }
    Ok(buf.get_u32())
}

pub fn get_u64(buf: &mut Bytes, field: &str) -> Result<u64, ProtocolError> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::PayloadError(format!("Missing {}", field)));
    }
    Ok(buf.get_u64())
}

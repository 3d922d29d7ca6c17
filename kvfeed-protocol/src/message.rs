/*
[ offset         : u64 ]
[ timestamp      : u64 ]
[ key_len        : u32 ]
[ key bytes      : [u8] ]
[ value_len      : u32 ]
[ value bytes    : [u8] ]
*/
use crate::errors::DeserializeError;
use crate::utils::read_bytes;
use bytes::{BufMut, Bytes, BytesMut};

/// One record of the shared log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Option<Vec<u8>>, // partitioning key
    pub value: Vec<u8>,
    pub timestamp: u64, // Unix epoch in millis
}

impl Message {
    pub fn serialize(&self, offset: u64) -> Bytes {
        let key = self.key.as_deref().unwrap_or_default();
        let mut buf = BytesMut::with_capacity(24 + key.len() + self.value.len());
        buf.put_u64(offset);
        buf.put_u64(self.timestamp);
        buf.put_u32(key.len() as u32);
        buf.extend_from_slice(key);
        buf.put_u32(self.value.len() as u32);
        buf.extend_from_slice(&self.value);
        buf.freeze()
    }

    pub fn deserialize(mut buf: &[u8]) -> Result<(u64, Message), DeserializeError> {
        let offset = read_u64(&mut buf)?;
        let timestamp = read_u64(&mut buf)?;

        let key_len = read_u32(&mut buf)? as usize;
        let key = if key_len > 0 {
            Some(read_bytes(&mut buf, key_len)?.to_vec())
        } else {
            None
        };

        let value_len = read_u32(&mut buf)? as usize;
        let value = read_bytes(&mut buf, value_len)?.to_vec();

        if !buf.is_empty() {
            return Err(DeserializeError::InvalidFormat(format!(
                "{} trailing bytes after message",
                buf.len()
            )));
        }

        Ok((
            offset,
            Message {
                key,
                value,
                timestamp,
            },
        ))
    }
}

fn read_u64(buf: &mut &[u8]) -> Result<u64, DeserializeError> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(read_bytes(buf, 8)?);
    Ok(u64::from_be_bytes(raw))
}

fn read_u32(buf: &mut &[u8]) -> Result<u32, DeserializeError> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(read_bytes(buf, 4)?);
    Ok(u32::from_be_bytes(raw))
}

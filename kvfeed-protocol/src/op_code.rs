use crate::ProtocolError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    Produce = 1,
    ConsumeWithGroup = 2,
    CommitOffset = 3,
    Metadata = 4,
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpCode::Produce),
            2 => Ok(OpCode::ConsumeWithGroup),
            3 => Ok(OpCode::CommitOffset),
            4 => Ok(OpCode::Metadata),
            _ => Err(ProtocolError::UnknownOpCode(value)),
        }
    }
}

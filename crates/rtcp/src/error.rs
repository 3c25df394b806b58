use std::fmt;

use num_enum::TryFromPrimitiveError;

use crate::packet::PacketKind;

#[derive(Debug)]
pub enum Error {
    BufferTooShort,
    UnknownPacketKind(u8),
    Incomplete,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<TryFromPrimitiveError<PacketKind>> for Error {
    fn from(value: TryFromPrimitiveError<PacketKind>) -> Self {
        Self::UnknownPacketKind(value.number)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

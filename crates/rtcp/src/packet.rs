use bytes::{Buf, BytesMut};
use num_enum::TryFromPrimitive;

use crate::ecn::EcnReport;
use crate::error::{Error, Result};

pub const VERSION_MASK: u8 = 0b1100_0000;
pub const PADDING_MASK: u8 = 0b0010_0000;
pub const COUNT_MASK: u8 = 0b0001_1111;

/// RTCP packet type (RFC 3550 section 12.1).
#[repr(u8)]
#[derive(PartialEq, Eq, Debug, Clone, Copy, TryFromPrimitive)]
pub enum PacketKind {
    SR = 0xC8,
    RR = 0xC9,
    SDES = 0xCA,
    BYE = 0xCB,
    APP = 0xCC,
}

/// A decoded RTCP packet. Only the application-defined ECN report is given
/// a real payload; other compound-packet members are recognized but not
/// decoded, since nothing downstream of this crate consumes them.
pub enum Rtcp {
    Ecn(EcnReport),
    Other(PacketKind),
}

impl Rtcp {
    /// packet type (PT): byte offset 1.
    pub fn packet_kind(buf: &[u8]) -> Result<PacketKind> {
        if buf.len() < 2 {
            return Err(Error::BufferTooShort);
        }
        Ok(PacketKind::try_from(buf[1])?)
    }

    /// length: 16 bits at byte offset 2, in 32-bit words minus one.
    pub fn peek_len(buf: &[u8]) -> Result<usize> {
        if buf.len() < 4 {
            return Err(Error::BufferTooShort);
        }
        let words = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        Ok((words + 1) * 4)
    }
}

/// Streaming RTCP decoder: feed it bytes via [`RtcpDecoder::extend`] and pull
/// complete packets out with [`RtcpDecoder::accept`] as they become
/// available.
pub struct RtcpDecoder {
    buf: BytesMut,
}

impl Default for RtcpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcpDecoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn accept(&mut self) -> Result<Option<Rtcp>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let kind = Rtcp::packet_kind(&self.buf[..])?;
        let size = Rtcp::peek_len(&self.buf[..])?;
        if self.buf.len() < size {
            return Ok(None);
        }

        let body = self.buf.split_to(size);
        Ok(Some(match kind {
            PacketKind::APP => {
                if let Some(report) = EcnReport::decode(&body[..])? {
                    Rtcp::Ecn(report)
                } else {
                    Rtcp::Other(kind)
                }
            }
            other => Rtcp::Other(other),
        }))
    }
}

pub(crate) fn read_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::Incomplete);
    }
    Ok(buf.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_len_matches_rfc_example() {
        let buffer = [0x80, 0xc8, 0x00, 0x06];
        assert_eq!(Rtcp::peek_len(&buffer).unwrap(), 28);
    }

    #[test]
    fn packet_kind_reads_byte_offset_one() {
        let buffer = [0x80, 0xc8];
        assert_eq!(Rtcp::packet_kind(&buffer).unwrap(), PacketKind::SR);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let buffer = [0x80, 0x00];
        assert!(matches!(Rtcp::packet_kind(&buffer), Err(Error::UnknownPacketKind(0))));
    }
}

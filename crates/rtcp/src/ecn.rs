use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::packet::{read_u32, PacketKind, COUNT_MASK, PADDING_MASK, VERSION_MASK};

/// The 4-byte ASCII name tag identifying this crate's application-defined
/// RTCP report, per RFC 3550 section 6.7's `name` field.
pub const APP_NAME: [u8; 4] = *b"ECN0";

const HEADER_LEN: usize = 8; // version/pt/length word + ssrc
const BODY_LEN: usize = 4 + 16; // name + payload
pub const WIRE_LEN: usize = HEADER_LEN + BODY_LEN;

/// The ECN feedback report carried as an RTCP application-defined packet
/// (see SPEC_FULL section 6). Emitted by the receiver at the lower of the
/// RTCP timer and a window-close event; consumed by the sender's rate hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcnReport {
    pub ssrc: u32,
    pub packet_count_tw: u32,
    pub ect_ce_count_tw: u32,
    pub capacity_kbits: u32,
    pub early_feedback_mode: bool,
}

impl EcnReport {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(WIRE_LEN);

        let words = (WIRE_LEN / 4 - 1) as u16;
        buf.put_u8(0b1000_0000); // V=2, P=0, subtype=0
        buf.put_u8(PacketKind::APP as u8);
        buf.put_u16(words);
        buf.put_u32(self.ssrc);
        buf.put(&APP_NAME[..]);
        buf.put_u32(self.packet_count_tw);
        buf.put_u32(self.ect_ce_count_tw);
        buf.put_u32(self.capacity_kbits);
        buf.put_u8(self.early_feedback_mode as u8);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(0);

        buf
    }

    /// Decodes an ECN report from a full RTCP packet body (header included).
    /// Returns `Ok(None)` if the packet is a well-formed APP packet but
    /// carries a different name tag (i.e. belongs to another application).
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < WIRE_LEN {
            return Err(Error::BufferTooShort);
        }

        let _version = (buf[0] & VERSION_MASK) >> 6;
        let _padding = (buf[0] & PADDING_MASK) != 0;
        let _subtype = buf[0] & COUNT_MASK;

        let mut cursor = &buf[4..];
        let ssrc = read_u32(&mut cursor)?;

        let mut name = [0u8; 4];
        name.copy_from_slice(&cursor[..4]);
        if name != APP_NAME {
            return Ok(None);
        }
        cursor = &cursor[4..];

        let packet_count_tw = read_u32(&mut cursor)?;
        let ect_ce_count_tw = read_u32(&mut cursor)?;
        let capacity_kbits = read_u32(&mut cursor)?;
        let early_feedback_mode = cursor[0] != 0;

        Ok(Some(Self {
            ssrc,
            packet_count_tw,
            ect_ce_count_tw,
            capacity_kbits,
            early_feedback_mode,
        }))
    }
}

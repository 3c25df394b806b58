use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

const MARKER_MASK: u8 = 0b1000_0000;
const PAYLOAD_KIND_MASK: u8 = 0b0111_1111;
const VERSION_MASK: u8 = 0b1100_0000;
const PADDING_MASK: u8 = 0b0010_0000;
const EXTENSION_MASK: u8 = 0b0001_0000;
const CSRC_COUNT_MASK: u8 = 0b0000_1111;

const LE_VERSION_MASK: u8 = !VERSION_MASK;
const LE_CSRC_COUNT_MASK: u8 = !CSRC_COUNT_MASK;
const LE_PAYLOAD_KIND_MASK: u8 = !PAYLOAD_KIND_MASK;
const LE_MARKER_MASK: u8 = !MARKER_MASK;

/// RTP fixed header (RFC 3550 section 5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |V=2|P|X|  CC   |M|     PT      |       sequence number         |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                           timestamp                           |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |           synchronization source (SSRC) identifier            |
///  +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
///  |            contributing source (CSRC) identifiers             |
///  |                             ....                              |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// When `extension` is set the fixed header is followed by exactly one
/// header extension. The block-stamper (see [`crate::sentinel`]) overloads
/// the first two bytes of that extension as a probing-block boundary marker;
/// this struct only carries the fixed-header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_kind: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc_list: Vec<u32>,
}

impl Header {
    pub const FIXED_LEN: usize = 12;

    pub fn len(&self) -> usize {
        Self::FIXED_LEN + self.csrc_list.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serializes the fixed header (and any CSRC list) into `buf`.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use rtp::header::Header;
    ///
    /// let header = Header {
    ///     padding: false,
    ///     extension: true,
    ///     marker: true,
    ///     payload_kind: 96,
    ///     sequence_number: 1265,
    ///     timestamp: 4169613229,
    ///     ssrc: 1744739836,
    ///     csrc_list: Vec::new(),
    /// };
    ///
    /// let mut writer = BytesMut::new();
    /// header.clone().encode(&mut writer);
    /// let decoded = Header::decode(&writer[..]).unwrap();
    /// assert_eq!(decoded, header);
    /// ```
    pub fn encode(self, buf: &mut BytesMut) {
        let mut basic = [0u8; 2];

        basic[0] = (basic[0] & LE_VERSION_MASK) | (2 << 6);
        basic[0] = if self.padding { basic[0] | (1 << 5) } else { basic[0] & !(1 << 5) };
        basic[0] = if self.extension { basic[0] | (1 << 4) } else { basic[0] & !(1 << 4) };
        basic[0] = (basic[0] & LE_CSRC_COUNT_MASK) | (self.csrc_list.len() as u8);

        basic[1] = if self.marker { basic[1] | MARKER_MASK } else { basic[1] & LE_MARKER_MASK };
        basic[1] = (basic[1] & LE_PAYLOAD_KIND_MASK) | (self.payload_kind & PAYLOAD_KIND_MASK);

        buf.put(&basic[..]);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for item in self.csrc_list {
            buf.put_u32(item);
        }
    }

    /// Parses a fixed header (and CSRC list) from `buf`.
    ///
    /// ```
    /// use rtp::header::Header;
    ///
    /// let buffer = [
    ///     0x90, 0x72, 0x04, 0xf1, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
    ///     0x9d, 0xfc,
    /// ];
    ///
    /// let header = Header::decode(&buffer[..]).unwrap();
    /// assert_eq!(header.padding, false);
    /// assert_eq!(header.extension, true);
    /// assert_eq!(header.sequence_number, 1265);
    /// assert_eq!(header.ssrc, 1744739836);
    /// ```
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::FIXED_LEN {
            return Err(Error::BufferTooShort);
        }

        let version = (buf[0] & VERSION_MASK) >> 6;
        if version != 2 {
            return Err(Error::UnsupportedVersion(version));
        }

        let padding = (buf[0] & PADDING_MASK) != 0;
        let extension = (buf[0] & EXTENSION_MASK) != 0;
        let csrc_count = (buf[0] & CSRC_COUNT_MASK) as usize;
        let marker = (buf[1] & MARKER_MASK) != 0;
        let payload_kind = buf[1] & PAYLOAD_KIND_MASK;
        buf.advance(2);

        let remaining_fixed = 8 + csrc_count * 4;
        if buf.len() < remaining_fixed {
            return Err(Error::BufferTooShort);
        }

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();
        let csrc_list = (0..csrc_count).map(|_| buf.get_u32()).collect();

        Ok(Self {
            padding,
            extension,
            marker,
            payload_kind,
            sequence_number,
            timestamp,
            ssrc,
            csrc_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_marker_and_extension_bits() {
        let header = Header {
            padding: true,
            extension: true,
            marker: true,
            payload_kind: 111,
            sequence_number: 42,
            timestamp: 9000,
            ssrc: 0xdead_beef,
            csrc_list: vec![1, 2, 3],
        };

        let mut buf = BytesMut::new();
        header.clone().encode(&mut buf);
        assert_eq!(buf.len(), header.len());

        let decoded = Header::decode(&buf[..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(Header::decode(&[0u8; 4]), Err(Error::BufferTooShort)));
    }

    #[test]
    fn rejects_non_v2() {
        let mut buf = [0u8; 12];
        buf[0] = 0b0100_0000;
        assert!(matches!(Header::decode(&buf), Err(Error::UnsupportedVersion(1))));
    }
}

use bytes::BytesMut;
use rand::Rng;

use crate::header::Header;

/// Per-stream sequence number, timestamp, and SSRC bookkeeping.
///
/// The sequence number and SSRC are chosen randomly at construction, per
/// RFC 3550 section 5.1, to make known-plaintext attacks against any later
/// encryption layer harder.
pub struct Packetizer {
    payload_kind: u8,
    sequence_number: u16,
    timestamp: u32,
    clock_rate_increment: u32,
    ssrc: u32,
}

impl Packetizer {
    pub fn new(payload_kind: u8, clock_rate_increment: u32) -> Self {
        let mut rng = rand::rng();
        Self {
            payload_kind,
            sequence_number: rng.random(),
            timestamp: rng.random(),
            clock_rate_increment,
            ssrc: rng.random(),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Builds the template header for the next outgoing packet and advances
    /// the sequence number. The marker bit is the caller's responsibility
    /// (set only on the last fragment of a frame).
    pub fn next_header(&mut self, marker: bool) -> Header {
        let header = Header {
            padding: false,
            extension: true,
            marker,
            payload_kind: self.payload_kind,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            csrc_list: Vec::new(),
        };
        self.sequence_number = self.sequence_number.wrapping_add(1);
        header
    }

    /// Advances the RTP clock by one frame period. Called once per pushed
    /// frame, after all of its fragments have been packetized.
    pub fn advance_frame(&mut self) {
        self.timestamp = self.timestamp.wrapping_add(self.clock_rate_increment);
    }

    pub fn encode_header(header: Header) -> BytesMut {
        let mut buf = BytesMut::with_capacity(header.len() + 2);
        header.encode(&mut buf);
        buf.extend_from_slice(&[0u8; 2]);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_contiguous() {
        let mut p = Packetizer::new(96, 3000);
        let first = p.next_header(false).sequence_number;
        let second = p.next_header(false).sequence_number;
        assert_eq!(second, first.wrapping_add(1));
    }

    #[test]
    fn marker_is_caller_controlled() {
        let mut p = Packetizer::new(96, 3000);
        assert!(!p.next_header(false).marker);
        assert!(p.next_header(true).marker);
    }

    #[test]
    fn encode_header_reserves_sentinel_word() {
        let mut p = Packetizer::new(96, 3000);
        let header = p.next_header(false);
        let buf = Packetizer::encode_header(header);
        assert_eq!(buf.len(), Header::FIXED_LEN + 2);
    }
}

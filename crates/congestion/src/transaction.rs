use std::borrow::Cow;

use bytes::BytesMut;
use rtp::{sentinel, Header, Packetizer};

use crate::error::{Error, Result};

/// Codec-specific scratch state a transaction carries alongside its RTP
/// headers. Only `Generic` is implemented by this crate: no codec
/// depacketizer is implemented here, but the slot is kept so a depacketizer
/// crate can be grafted onto the transaction without reshaping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHeaders {
    Generic,
    H264,
    H265,
    H266,
}

/// One RTP datagram awaiting send: a header (with its reserved sentinel
/// word) plus a payload that is either borrowed from the caller's frame
/// buffer or owned (after fragmentation or SRTP coalescing).
pub struct PacketEntry<'a> {
    header: BytesMut,
    payload: Cow<'a, [u8]>,
    auth_tag: Option<[u8; 10]>,
}

impl<'a> PacketEntry<'a> {
    /// Scatter-gather view of this packet's wire bytes, in send order.
    pub fn iovec(&self) -> Vec<&[u8]> {
        let mut parts = vec![&self.header[..], self.payload.as_ref()];
        if let Some(tag) = &self.auth_tag {
            parts.push(&tag[..]);
        }
        parts
    }

    pub fn total_len(&self) -> usize {
        self.header.len() + self.payload.len() + self.auth_tag.map_or(0, |t| t.len())
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn stamp_sentinel(&mut self, value: u16) {
        sentinel::stamp(&mut self.header, value);
    }

    pub fn sequence_number(&self) -> u16 {
        Header::decode(&self.header).map(|h| h.sequence_number).unwrap_or(0)
    }
}

/// The unit a sender flushes atomically: the accumulated RTP packets for one
/// media frame (SPEC_FULL section 3).
pub struct Transaction<'a> {
    packets: Vec<PacketEntry<'a>>,
    media_headers: MediaHeaders,
    authenticate_rtp: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(media_headers: MediaHeaders, authenticate_rtp: bool) -> Self {
        Self { packets: Vec::new(), media_headers, authenticate_rtp }
    }

    pub fn media_headers(&self) -> MediaHeaders {
        self.media_headers
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> &[PacketEntry<'a>] {
        &self.packets
    }

    pub fn packets_mut(&mut self) -> &mut [PacketEntry<'a>] {
        &mut self.packets
    }

    /// Appends one RTP packet carrying `payload`, pulling the next
    /// sequence number and timestamp template from `packetizer`.
    pub fn enqueue_message(
        &mut self,
        packetizer: &mut Packetizer,
        payload: Cow<'a, [u8]>,
        marker: bool,
    ) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::InvalidValue);
        }

        let header = packetizer.next_header(marker);
        let header_buf = Packetizer::encode_header(header);
        let auth_tag = if self.authenticate_rtp { Some([0u8; 10]) } else { None };

        self.packets.push(PacketEntry { header: header_buf, payload, auth_tag });
        Ok(())
    }
}

/// Splits `frame` into MTU-sized fragments, used when `RCE_FRAGMENT_GENERIC`
/// is set and the pushed frame exceeds the configured payload budget. The
/// marker bit belongs only on the fragment carrying the final byte of the
/// frame; callers enqueue fragments in order and set the marker on the last
/// one themselves.
pub fn fragment_generic(frame: &[u8], mtu_payload: usize) -> Vec<&[u8]> {
    if frame.is_empty() {
        return Vec::new();
    }
    frame.chunks(mtu_payload.max(1)).collect()
}

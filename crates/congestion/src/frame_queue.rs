use std::borrow::Cow;
use std::net::SocketAddr;

use rtp::Packetizer;
use transport::DatagramSocket;

use crate::error::Result;
use crate::pacer;
use crate::rate::RateState;
use crate::transaction::{fragment_generic, MediaHeaders, Transaction};

/// Options controlling how a [`FrameQueue`] turns pushed frames into RTP
/// transactions.
#[derive(Debug, Clone, Copy)]
pub struct FrameQueueOptions {
    /// MTU payload budget a generic frame is fragmented against when it
    /// exceeds this size (`RCE_FRAGMENT_GENERIC`).
    pub mtu_payload: usize,
    pub fragment_generic: bool,
    /// Reserve a 10-byte SRTP auth-tag slot per packet. No SRTP cipher is
    /// implemented by this crate; the slot exists so one can be grafted on
    /// without reshaping the transaction.
    pub authenticate_rtp: bool,
}

impl Default for FrameQueueOptions {
    fn default() -> Self {
        Self { mtu_payload: 1200, fragment_generic: true, authenticate_rtp: false }
    }
}

/// Ties the packetizer, transaction lifecycle, and pacer together into the
/// single entry point a stream calls once per pushed media frame
/// (SPEC_FULL section 4.C).
pub struct FrameQueue {
    packetizer: Packetizer,
    options: FrameQueueOptions,
}

impl FrameQueue {
    pub fn new(payload_kind: u8, clock_rate_increment: u32, options: FrameQueueOptions) -> Self {
        Self { packetizer: Packetizer::new(payload_kind, clock_rate_increment), options }
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    /// Fragments (if configured and needed), paces, and sends one media
    /// frame. The transaction backing this call is a stack-local value, so
    /// it is released on every exit path, including error paths, by
    /// ordinary drop semantics rather than an explicit deinit call.
    pub fn push_frame(
        &mut self,
        frame: &[u8],
        socket: &DatagramSocket,
        to: SocketAddr,
        rate: &RateState,
    ) -> Result<()> {
        let mut txn = Transaction::new(MediaHeaders::Generic, self.options.authenticate_rtp);

        let fragments: Vec<&[u8]> =
            if self.options.fragment_generic && frame.len() > self.options.mtu_payload {
                fragment_generic(frame, self.options.mtu_payload)
            } else {
                vec![frame]
            };

        let last = fragments.len().saturating_sub(1);
        for (i, fragment) in fragments.iter().enumerate() {
            txn.enqueue_message(&mut self.packetizer, Cow::Borrowed(*fragment), i == last)?;
        }

        self.packetizer.advance_frame();
        pacer::flush(&mut txn, socket, to, rate)
    }
}

#[cfg(test)]
mod tests {
    use transport::SocketOptions;

    use super::*;

    #[test]
    fn fragments_large_frame_into_multiple_packets() {
        let sender = DatagramSocket::bind("127.0.0.1:0".parse().unwrap(), SocketOptions::default()).unwrap();
        let receiver = DatagramSocket::bind("127.0.0.1:0".parse().unwrap(), SocketOptions::default()).unwrap();
        let to = receiver.local_addr().unwrap();

        let mut queue = FrameQueue::new(
            96,
            3000,
            FrameQueueOptions { mtu_payload: 1000, fragment_generic: true, authenticate_rtp: false },
        );
        let rate = RateState::new(100_000_000, 10);
        let frame = vec![7u8; 2500];

        queue.push_frame(&frame, &sender, to, &rate).unwrap();

        let mut received = 0;
        let mut buf = [0u8; 1600];
        while receiver.recv_with_ecn(&mut buf).is_ok() {
            received += 1;
            if received == 3 {
                break;
            }
        }
        assert_eq!(received, 3);
    }

    #[test]
    fn rejects_empty_frame() {
        let sender = DatagramSocket::bind("127.0.0.1:0".parse().unwrap(), SocketOptions::default()).unwrap();
        let to = sender.local_addr().unwrap();
        let mut queue = FrameQueue::new(96, 3000, FrameQueueOptions::default());
        let rate = RateState::new(100_000_000, 10);

        assert!(queue.push_frame(&[], &sender, to, &rate).is_err());
    }
}

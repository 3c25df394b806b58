use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rtp::sentinel;
use transport::DatagramSocket;

use crate::error::{Error, Result};
use crate::rate::{RateState, FEEDBACK_WAIT};
use crate::transaction::Transaction;

/// The MTU payload the pacer assumes per packet when computing a block's
/// send time, regardless of the packet's actual size (SPEC_FULL section
/// 4.D's pseudocode; the original's `bytesInBlock = packets * MAX_IPV4_PAYLOAD`).
pub const MAX_IPV4_PAYLOAD: u64 = 1500;

/// Partitions a transaction into probing blocks, stamps each block's
/// boundary sentinels, sends the block, and paces against the shared rate
/// state between blocks (SPEC_FULL section 4.D).
///
/// A block absorbs its trailing remainder rather than sending a
/// separately-paced runt block: if what's left after filling a full block
/// would itself be smaller than half a block, it's folded into the current
/// one instead.
pub fn flush(txn: &mut Transaction<'_>, socket: &DatagramSocket, to: SocketAddr, rate: &RateState) -> Result<()> {
    let total = txn.len();
    if total == 0 {
        return Err(Error::InvalidValue);
    }

    let mut start = 0usize;
    while start < total {
        rate.wait_until_sendable(FEEDBACK_WAIT);
        if rate.is_shutdown() {
            return Err(Error::SendError(transport::Error::Interrupted));
        }

        let packets_in_block = rate.packets_in_block().max(1);
        let left = total - start;
        let mut end = if left > packets_in_block { start + packets_in_block } else { total };

        if left > packets_in_block {
            let remainder = left - packets_in_block;
            if remainder > 0 && remainder < packets_in_block / 2 {
                end = total;
            }
        }

        // A one-packet block writes START then overwrites it with END; the
        // overwrite is intentional (see DESIGN.md's Open Question record),
        // not an oversight.
        txn.packets_mut()[start].stamp_sentinel(sentinel::PROBING_BLOCK_START);
        txn.packets_mut()[end - 1].stamp_sentinel(sentinel::PROBING_BLOCK_END);

        let block_started_at = Instant::now();
        for packet in &txn.packets()[start..end] {
            let iov = packet.iovec();
            if let Err(e) = socket.send(&iov, to) {
                return Err(Error::SendError(e));
            }
        }

        let packets_sent = (end - start) as u64;
        sleep_out_block_time(packets_sent, rate.load_kbits(), block_started_at.elapsed());
        start = end;
    }

    Ok(())
}

fn sleep_out_block_time(packets_sent: u64, load_kbits: u32, elapsed: Duration) {
    let load_kbits = load_kbits.max(1) as u64;
    let bytes_in_block = packets_sent * MAX_IPV4_PAYLOAD;
    let block_time_us = bytes_in_block * 8_000 / load_kbits;
    let block_time = Duration::from_micros(block_time_us);
    if let Some(remaining) = block_time.checked_sub(elapsed) {
        std::thread::sleep(remaining);
    }
}

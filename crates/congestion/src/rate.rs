use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How long a sender tolerates feedback silence before it considers the
/// link starved and backs off regardless of the last reported capacity.
pub const FEEDBACK_TIMEOUT_US: u64 = 2_000_000;

/// The floor the rate controller never proposes below, matching the
/// reference receiver's `MIN_BITRATE_KBITS` constant.
pub const MIN_BITRATE_KBITS: u32 = 500;

/// The bound on how long the pacer blocks waiting for feedback between
/// probing blocks before proceeding anyway.
pub const FEEDBACK_WAIT: Duration = Duration::from_millis(200);

/// The sender-side rate state machine (SPEC_FULL section 4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMode {
    FreeRun,
    Congested,
    Starved,
}

struct Inner {
    load_kbits: u32,
    packets_in_block: usize,
    last_feedback_received: Option<Instant>,
    link_capacity_low: bool,
    shutdown: bool,
}

/// Shared mutable rate state, read once per probing block by the pacer and
/// written by the RTCP ECN report hook. Guarded by a single mutex +
/// condition variable, matching the reference implementation's
/// `{loadkbits, packetsInBlock, lastFeedbackReceivedUs, linkCapacityLow}`
/// shared struct.
pub struct RateState {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl RateState {
    pub fn new(initial_load_kbits: u32, packets_in_block: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                load_kbits: initial_load_kbits,
                packets_in_block,
                last_feedback_received: None,
                link_capacity_low: false,
                shutdown: false,
            }),
            cv: Condvar::new(),
        })
    }

    pub fn load_kbits(&self) -> u32 {
        self.inner.lock().load_kbits
    }

    pub fn packets_in_block(&self) -> usize {
        self.inner.lock().packets_in_block
    }

    pub fn set_packets_in_block(&self, packets_in_block: usize) {
        self.inner.lock().packets_in_block = packets_in_block;
    }

    pub fn mode(&self) -> RateMode {
        let g = self.inner.lock();
        if is_stale(&g) {
            RateMode::Starved
        } else if g.link_capacity_low {
            RateMode::Congested
        } else {
            RateMode::FreeRun
        }
    }

    /// Applies feedback carried by an incoming ECN report. `load_kbits` is
    /// `None` when the report's capacity estimate should be ignored (see the
    /// `capacity_kbits == 0` decision recorded in DESIGN.md).
    pub fn apply_feedback(&self, load_kbits: Option<u32>, link_capacity_low: bool) {
        {
            let mut g = self.inner.lock();
            if let Some(kbits) = load_kbits {
                g.load_kbits = kbits;
            }
            g.link_capacity_low = link_capacity_low;
            g.last_feedback_received = Some(Instant::now());
        }
        self.cv.notify_all();
    }

    /// Blocks the calling thread until feedback is fresh and the link is
    /// not congested, or until `timeout` elapses.
    pub fn wait_until_sendable(&self, timeout: Duration) {
        let mut g = self.inner.lock();
        let deadline = Instant::now() + timeout;
        while !g.shutdown && needs_wait(&g) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if self.cv.wait_for(&mut g, remaining).timed_out() {
                break;
            }
        }
    }

    pub fn shutdown(&self) {
        self.inner.lock().shutdown = true;
        self.cv.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }
}

fn is_stale(g: &Inner) -> bool {
    match g.last_feedback_received {
        Some(t) => t.elapsed() > Duration::from_micros(FEEDBACK_TIMEOUT_US),
        None => false,
    }
}

fn needs_wait(g: &Inner) -> bool {
    is_stale(g) || g.link_capacity_low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_free_run_with_no_feedback() {
        let state = RateState::new(1000, 10);
        assert_eq!(state.mode(), RateMode::FreeRun);
    }

    #[test]
    fn congested_after_early_feedback_report() {
        let state = RateState::new(1000, 10);
        state.apply_feedback(Some(MIN_BITRATE_KBITS), true);
        assert_eq!(state.mode(), RateMode::Congested);
        assert_eq!(state.load_kbits(), MIN_BITRATE_KBITS);
    }

    #[test]
    fn clears_congestion_on_next_clean_report() {
        let state = RateState::new(1000, 10);
        state.apply_feedback(Some(MIN_BITRATE_KBITS), true);
        state.apply_feedback(Some(2000), false);
        assert_eq!(state.mode(), RateMode::FreeRun);
        assert_eq!(state.load_kbits(), 2000);
    }

    #[test]
    fn wait_returns_promptly_once_signalled() {
        let state = RateState::new(1000, 10);
        state.apply_feedback(Some(1000), true);
        assert_eq!(state.mode(), RateMode::Congested);

        let state2 = state.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            state2.apply_feedback(Some(1000), false);
        });

        let started = Instant::now();
        state.wait_until_sendable(FEEDBACK_WAIT);
        assert!(started.elapsed() < FEEDBACK_WAIT);
        handle.join().unwrap();
    }
}

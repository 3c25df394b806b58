use std::time::{Duration, Instant};

use transport::EcnCodepoint;

/// Receiver-side ECN observation window configuration.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    /// `RCC_ECN_AGGREGATION_TIME_WINDOW`: how long a window stays open
    /// before being closed on its own, absent an earlier CE-triggered close.
    pub aggregation_window: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { aggregation_window: Duration::from_millis(100) }
    }
}

/// The inputs an [`crate::hook`]-side report builder needs once a window
/// closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReport {
    pub packet_count_tw: u32,
    pub ect_ce_count_tw: u32,
    pub capacity_kbits: u32,
    pub early_feedback_mode: bool,
}

/// Accumulates per-datagram ECN observations into windows and derives a
/// capacity estimate once a full probing block has been observed
/// end-to-end (SPEC_FULL section 4.G).
pub struct CapacityEstimator {
    config: EstimatorConfig,
    window_start: Option<Instant>,
    packet_count: u32,
    ect_ce_count: u32,
    bytes_received: u64,
    saw_block_start: bool,
    saw_block_end: bool,
    capacity_kbits: u32,
}

impl CapacityEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            window_start: None,
            packet_count: 0,
            ect_ce_count: 0,
            bytes_received: 0,
            saw_block_start: false,
            saw_block_end: false,
            capacity_kbits: 0,
        }
    }

    /// Records one received datagram. Returns the completed window's report
    /// inputs if this observation closed the window: either the aggregation
    /// timer elapsed, or a CE mark was just observed (early feedback mode
    /// closes the window immediately rather than waiting out the timer).
    pub fn observe(&mut self, len: usize, ecn: EcnCodepoint, sentinel: Option<u16>) -> Option<WindowReport> {
        let now = Instant::now();
        let window_start = *self.window_start.get_or_insert(now);

        self.packet_count += 1;
        self.bytes_received += len as u64;

        let is_ce = ecn.is_congestion_experienced();
        if is_ce {
            self.ect_ce_count += 1;
        }

        match sentinel {
            Some(v) if v == rtp::sentinel::PROBING_BLOCK_START => self.saw_block_start = true,
            Some(v) if v == rtp::sentinel::PROBING_BLOCK_END => self.saw_block_end = true,
            _ => {}
        }

        let elapsed = now.duration_since(window_start);
        if is_ce || elapsed >= self.config.aggregation_window {
            Some(self.close_window(elapsed))
        } else {
            None
        }
    }

    /// Forces the current window closed regardless of elapsed time or CE
    /// marks, for the RTCP compound-packet timer leg (SPEC_FULL section
    /// 4.H): emission happens at the lower of that timer and a window-close
    /// event, so a quiet window still needs to be flushed on the timer's own
    /// cadence. Returns `None` if no datagram has been observed since the
    /// last close — there is nothing to report.
    pub fn close_now(&mut self) -> Option<WindowReport> {
        if self.window_start.is_none() {
            return None;
        }
        let elapsed = self.window_start.map(|s| s.elapsed()).unwrap_or_default();
        Some(self.close_window(elapsed))
    }

    fn close_window(&mut self, elapsed: Duration) -> WindowReport {
        let early_feedback_mode = self.ect_ce_count > 0;

        if self.saw_block_start && self.saw_block_end {
            let elapsed_ms = elapsed.as_millis().max(1) as u64;
            self.capacity_kbits = (self.bytes_received * 8 / elapsed_ms) as u32;
        }

        let report = WindowReport {
            packet_count_tw: self.packet_count,
            ect_ce_count_tw: self.ect_ce_count,
            capacity_kbits: self.capacity_kbits,
            early_feedback_mode,
        };

        self.window_start = None;
        self.packet_count = 0;
        self.ect_ce_count = 0;
        self.bytes_received = 0;
        self.saw_block_start = false;
        self.saw_block_end = false;

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtp::sentinel;

    #[test]
    fn ce_mark_closes_window_immediately() {
        let mut estimator = CapacityEstimator::new(EstimatorConfig {
            aggregation_window: Duration::from_secs(10),
        });

        assert!(estimator.observe(100, EcnCodepoint::Ect1, None).is_none());
        let report = estimator.observe(100, EcnCodepoint::Ce, None).unwrap();
        assert!(report.early_feedback_mode);
        assert_eq!(report.packet_count_tw, 2);
        assert_eq!(report.ect_ce_count_tw, 1);
    }

    #[test]
    fn capacity_only_updates_on_full_block_observation() {
        let mut estimator = CapacityEstimator::new(EstimatorConfig {
            aggregation_window: Duration::from_millis(1),
        });

        estimator.observe(1000, EcnCodepoint::Ect1, Some(sentinel::PROBING_BLOCK_START));
        std::thread::sleep(Duration::from_millis(5));
        let report = estimator.observe(1000, EcnCodepoint::Ect1, Some(sentinel::PROBING_BLOCK_END)).unwrap();
        assert!(report.capacity_kbits > 0);
    }

    #[test]
    fn partial_block_leaves_capacity_unmeasured() {
        let mut estimator = CapacityEstimator::new(EstimatorConfig {
            aggregation_window: Duration::from_millis(1),
        });
        std::thread::sleep(Duration::from_millis(2));
        let report = estimator.observe(1000, EcnCodepoint::Ect1, None).unwrap();
        assert_eq!(report.capacity_kbits, 0);
    }

    #[test]
    fn ce_count_never_exceeds_packet_count() {
        let mut estimator = CapacityEstimator::new(EstimatorConfig {
            aggregation_window: Duration::from_secs(10),
        });
        let report = estimator.observe(10, EcnCodepoint::Ce, None).unwrap();
        assert!(report.ect_ce_count_tw <= report.packet_count_tw);
    }
}

use rtcp::EcnReport;

use crate::rate::{RateState, MIN_BITRATE_KBITS};

/// Installable callback invoked for every inbound ECN report. Default
/// methods are empty, so callers override only what they need — the same
/// shape as the teacher's handler-trait-with-default-methods pattern used
/// elsewhere in this lineage for optional event hooks.
pub trait EcnHook: Send + Sync {
    #[allow(unused_variables)]
    fn on_ecn_report(&self, report: &EcnReport) {}
}

/// A hook that does nothing; the default when a stream doesn't need to
/// observe ECN feedback directly (it still drives the shared [`RateState`]
/// via [`apply_report`]).
pub struct NoopHook;

impl EcnHook for NoopHook {}

/// Applies an incoming ECN report to the shared rate state. This is the
/// sender-side reaction to receiver feedback that the pacer observes at its
/// next block boundary.
///
/// When `early_feedback_mode` is set the rate is clamped to
/// [`MIN_BITRATE_KBITS`] regardless of the reported capacity. Otherwise, a
/// reported `capacity_kbits` of zero is treated as "no new information" and
/// leaves the previous load target untouched (see DESIGN.md's Open
/// Question record).
pub fn apply_report(state: &RateState, report: &EcnReport) {
    let load_kbits = if report.early_feedback_mode {
        Some(MIN_BITRATE_KBITS)
    } else if report.capacity_kbits == 0 {
        None
    } else {
        Some(report.capacity_kbits.max(MIN_BITRATE_KBITS))
    };

    state.apply_feedback(load_kbits, report.early_feedback_mode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_report_leaves_load_unchanged() {
        let state = RateState::new(3000, 10);
        let report = EcnReport {
            ssrc: 1,
            packet_count_tw: 10,
            ect_ce_count_tw: 0,
            capacity_kbits: 0,
            early_feedback_mode: false,
        };
        apply_report(&state, &report);
        assert_eq!(state.load_kbits(), 3000);
    }

    #[test]
    fn early_feedback_clamps_to_minimum() {
        let state = RateState::new(8000, 10);
        let report = EcnReport {
            ssrc: 1,
            packet_count_tw: 10,
            ect_ce_count_tw: 3,
            capacity_kbits: 4000,
            early_feedback_mode: true,
        };
        apply_report(&state, &report);
        assert_eq!(state.load_kbits(), MIN_BITRATE_KBITS);
    }

    #[test]
    fn clean_report_adopts_reported_capacity() {
        let state = RateState::new(1000, 10);
        let report = EcnReport {
            ssrc: 1,
            packet_count_tw: 10,
            ect_ce_count_tw: 0,
            capacity_kbits: 6000,
            early_feedback_mode: false,
        };
        apply_report(&state, &report);
        assert_eq!(state.load_kbits(), 6000);
    }
}

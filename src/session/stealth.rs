//! Per-action jittered timing.
//!
//! Fixed delays are a fingerprint. Every wait the engine takes is drawn
//! uniformly from a per-action range, overridable per domain through the
//! configuration source.

use crate::config::{DelayRange, StealthParams};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The kinds of action the supervisor hands out delays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Navigate,
    Scroll,
    Read,
    Probe,
}

impl StealthParams {
    fn range_for(&self, action: ActionType) -> DelayRange {
        match action {
            ActionType::Navigate => self.navigate_delay,
            ActionType::Scroll => self.scroll_delay,
            ActionType::Read => self.read_delay,
            ActionType::Probe => self.probe_delay,
        }
    }

    /// Draw a jittered delay for `action` from its configured range.
    pub fn delay_for(&self, action: ActionType) -> Duration {
        let range = self.range_for(action);
        jitter(range)
    }
}

/// Uniform draw from the inclusive range. Degenerate ranges (min >= max)
/// collapse to min rather than panicking.
pub fn jitter(range: DelayRange) -> Duration {
    let ms = if range.min_ms >= range.max_ms {
        range.min_ms
    } else {
        rand::thread_rng().gen_range(range.min_ms..=range.max_ms)
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_configured_bounds() {
        let params = StealthParams::default();
        for _ in 0..200 {
            let d = params.delay_for(ActionType::Scroll).as_millis() as u64;
            assert!(d >= params.scroll_delay.min_ms);
            assert!(d <= params.scroll_delay.max_ms);
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let d = jitter(DelayRange::new(500, 500));
        assert_eq!(d, Duration::from_millis(500));
        let d = jitter(DelayRange::new(500, 100));
        assert_eq!(d, Duration::from_millis(500));
    }

    #[test]
    fn per_action_ranges_are_distinct() {
        let params = StealthParams::default();
        // Probe waits are meant to be much longer than read waits.
        assert!(params.probe_delay.min_ms > params.read_delay.max_ms);
    }
}

//! Funding rate flip detector
//!
//! A deeply negative funding rate means shorts are paying heavily to stay in.
//! When the most recent print flips positive after such a stretch, short pressure
//! has unwound.

use chrono::Duration;
use tracing::{debug, info};

use super::window::BoundedTimeWindow;
use crate::domain::{Sample, Signal};

/// How long funding samples are retained
pub const FUNDING_RETENTION_SECS: i64 = 24 * 60 * 60;
/// Minimum samples before the pattern is evaluated
pub const FUNDING_MIN_SAMPLES: usize = 3;
/// Number of most recent samples the pattern looks at
pub const FUNDING_RECENT_SAMPLES: usize = 10;
/// A prior rate below this counts as deeply negative (-2%)
pub const FUNDING_DEEP_NEGATIVE: f64 = -0.02;
/// The current rate must exceed this to count as positive (0.1%)
pub const FUNDING_POSITIVE: f64 = 0.001;

/// Funding rate flip detector
#[derive(Debug)]
pub struct FundingRateFlipDetector {
    window: BoundedTimeWindow,
}

impl Default for FundingRateFlipDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FundingRateFlipDetector {
    pub fn new() -> Self {
        Self {
            window: BoundedTimeWindow::new(Duration::seconds(FUNDING_RETENTION_SECS)),
        }
    }

    /// Record `current` and check for a deep-negative to positive flip
    pub fn update(&mut self, current: Sample) -> Option<Signal> {
        self.window.push(current);

        if self.window.len() < FUNDING_MIN_SAMPLES {
            debug!("Funding history too short ({} samples)", self.window.len());
            return None;
        }

        let recent: Vec<f64> = self
            .window
            .recent(FUNDING_RECENT_SAMPLES)
            .map(|s| s.value)
            .collect();
        let (_, prior) = recent.split_last()?;
        let current_rate = current.value;

        let had_deep_negative = prior.iter().any(|r| *r < FUNDING_DEEP_NEGATIVE);
        let is_now_positive = current_rate > FUNDING_POSITIVE;

        if !(had_deep_negative && is_now_positive) {
            return None;
        }

        let min_rate = prior.iter().copied().fold(f64::INFINITY, f64::min);

        info!(
            "Funding flipped positive: {:.4}% -> {:.4}%",
            min_rate * 100.0,
            current_rate * 100.0
        );

        Some(Signal::FundingFlipPositive {
            min_rate: min_rate * 100.0,
            current_rate: current_rate * 100.0,
            change: (current_rate - min_rate) * 100.0,
        })
    }

    pub fn window(&self) -> &BoundedTimeWindow {
        &self.window
    }
}

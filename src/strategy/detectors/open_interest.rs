//! Open interest drop detector
//!
//! Flags a sharp fall in open interest against a reference sample taken at least
//! 5 minutes (or 1 hour) earlier. The short horizon is checked first and wins.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::window::BoundedTimeWindow;
use crate::domain::{Sample, Signal};
use crate::strategy::calculations::drop_pct;

/// How long open interest samples are retained
pub const OI_RETENTION_SECS: i64 = 2 * 60 * 60;
/// Short horizon for the fast drop check
pub const OI_SHORT_HORIZON_SECS: i64 = 5 * 60;
/// Long horizon for the slow drop check
pub const OI_LONG_HORIZON_SECS: i64 = 60 * 60;
/// Drop percentage that fires over the short horizon
pub const OI_SHORT_DROP_PCT: f64 = 15.0;
/// Drop percentage that fires over the long horizon
pub const OI_LONG_DROP_PCT: f64 = 30.0;

/// Open interest drop detector
#[derive(Debug)]
pub struct OpenInterestDropDetector {
    window: BoundedTimeWindow,
}

impl Default for OpenInterestDropDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenInterestDropDetector {
    pub fn new() -> Self {
        Self {
            window: BoundedTimeWindow::new(Duration::seconds(OI_RETENTION_SECS)),
        }
    }

    /// Record `current` and check both horizons
    pub fn update(&mut self, current: Sample) -> Option<Signal> {
        self.window.push(current);

        if self.window.len() < 2 {
            debug!("OI history too short ({} samples)", self.window.len());
            return None;
        }

        let now = current.timestamp;
        let new_oi = current.value;

        if let Some(old_oi) = self.reference(now, OI_SHORT_HORIZON_SECS) {
            if let Some(drop) = drop_pct(old_oi, new_oi) {
                if drop > OI_SHORT_DROP_PCT {
                    info!(
                        "OI dropped {:.2}% in 5min: {:.0} -> {:.0}",
                        drop, old_oi, new_oi
                    );
                    return Some(Signal::OiDrop5Min {
                        drop_pct: drop,
                        old_oi,
                        new_oi,
                    });
                }
            }
        }

        if let Some(old_oi) = self.reference(now, OI_LONG_HORIZON_SECS) {
            if let Some(drop) = drop_pct(old_oi, new_oi) {
                if drop > OI_LONG_DROP_PCT {
                    info!(
                        "OI dropped {:.2}% in 1h: {:.0} -> {:.0}",
                        drop, old_oi, new_oi
                    );
                    return Some(Signal::OiDrop1Hour {
                        drop_pct: drop,
                        old_oi,
                        new_oi,
                    });
                }
            }
        }

        None
    }

    /// Value of the most recent sample at least `horizon_secs` old
    fn reference(&self, now: DateTime<Utc>, horizon_secs: i64) -> Option<f64> {
        self.window
            .latest_at_least(now, Duration::seconds(horizon_secs))
            .map(|s| s.value)
    }

    pub fn window(&self) -> &BoundedTimeWindow {
        &self.window
    }
}

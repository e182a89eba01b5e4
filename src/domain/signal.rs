//! Failure signals produced by the detectors
//!
//! Each variant carries exactly the fields needed to render an alert. Signals are
//! produced once by a detector and consumed once by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected failure pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Signal {
    /// Open interest fell more than 15% against a sample at least 5 minutes old
    #[serde(rename = "oi_drop_5min")]
    OiDrop5Min {
        drop_pct: f64,
        old_oi: f64,
        new_oi: f64,
    },
    /// Open interest fell more than 30% against a sample at least 1 hour old
    #[serde(rename = "oi_drop_1hour")]
    OiDrop1Hour {
        drop_pct: f64,
        old_oi: f64,
        new_oi: f64,
    },
    /// Price made a higher high while RSI made a lower high
    #[serde(rename = "bearish_divergence")]
    BearishDivergence {
        price1: f64,
        price2: f64,
        rsi1: f64,
        rsi2: f64,
        timestamp: DateTime<Utc>,
    },
    /// Funding rate flipped positive after a deep negative print (percent units)
    #[serde(rename = "funding_flip_positive")]
    FundingFlipPositive {
        min_rate: f64,
        current_rate: f64,
        change: f64,
    },
}

impl Signal {
    /// Wire discriminator for this signal
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::OiDrop5Min { .. } => "oi_drop_5min",
            Signal::OiDrop1Hour { .. } => "oi_drop_1hour",
            Signal::BearishDivergence { .. } => "bearish_divergence",
            Signal::FundingFlipPositive { .. } => "funding_flip_positive",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

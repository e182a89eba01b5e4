use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single timestamped observation (open interest, funding rate, ...)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    /// Sample stamped with the current wall clock
    pub fn now(value: f64) -> Self {
        Self::new(value, Utc::now())
    }

    /// Age of this sample relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

/// A closed kline reduced to what the divergence detector needs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub close_time: DateTime<Utc>,
    pub close: f64,
}

impl PriceBar {
    pub fn new(close_time: DateTime<Utc>, close: f64) -> Self {
        Self { close_time, close }
    }
}

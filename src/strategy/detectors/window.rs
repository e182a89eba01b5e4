//! Time-bounded sample history shared by the open-interest and funding detectors

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::domain::Sample;

/// Append-only sample window that forgets anything older than `retention`.
///
/// "Now" is the timestamp of the sample being pushed, so the window is driven
/// purely by sample time and never reads the wall clock. Eviction checks every
/// entry rather than stopping at the first young one, so out-of-order timestamps
/// are still dropped once they age out.
#[derive(Debug, Clone)]
pub struct BoundedTimeWindow {
    samples: VecDeque<Sample>,
    retention: Duration,
}

impl BoundedTimeWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            retention,
        }
    }

    /// Append `sample`, then evict every entry whose age is `>= retention`
    pub fn push(&mut self, sample: Sample) {
        let now = sample.timestamp;
        self.samples.push_back(sample);
        let retention = self.retention;
        self.samples.retain(|s| s.age(now) < retention);
    }

    /// Surviving samples in insertion order
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Most recently pushed sample whose age relative to `now` is at least `horizon`
    pub fn latest_at_least(&self, now: DateTime<Utc>, horizon: Duration) -> Option<&Sample> {
        self.samples.iter().rev().find(|s| s.age(now) >= horizon)
    }

    /// The last `n` samples (or all of them), oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

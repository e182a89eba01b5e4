//! RSI divergence detector
//!
//! Tracks closed price bars and looks for bearish divergence: price printing a
//! higher high while RSI prints a lower high. Momentum failing to confirm a new
//! high is read as an exhausted move.

use std::collections::VecDeque;
use tracing::{debug, info};

use crate::domain::{PriceBar, Signal};
use crate::strategy::calculations::{defined, local_maxima, local_minima, rsi};

/// Maximum number of bars kept
pub const MAX_BARS: usize = 200;
/// Bars required before divergence is evaluated
pub const MIN_BARS: usize = 50;
/// RSI period
pub const RSI_PERIOD: usize = 14;
/// Maximum index gap between the two price highs
pub const DIVERGENCE_LOOKBACK: usize = 20;
/// Neighbourhood size on each side for local extrema
pub const EXTREMA_ORDER: usize = 5;

/// Price and oscillator extrema of the current series
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extrema {
    pub price_highs: Vec<usize>,
    pub price_lows: Vec<usize>,
    pub rsi_highs: Vec<usize>,
    pub rsi_lows: Vec<usize>,
}

/// RSI divergence detector
#[derive(Debug)]
pub struct RsiDivergenceDetector {
    bars: VecDeque<PriceBar>,
    rsi: Vec<Option<f64>>,
}

impl Default for RsiDivergenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RsiDivergenceDetector {
    pub fn new() -> Self {
        Self {
            bars: VecDeque::with_capacity(MAX_BARS + 1),
            rsi: Vec::with_capacity(MAX_BARS),
        }
    }

    /// Append a closed bar and evaluate divergence with the default parameters
    pub fn update(&mut self, bar: PriceBar) -> Option<Signal> {
        self.bars.push_back(bar);
        while self.bars.len() > MAX_BARS {
            self.bars.pop_front();
        }
        // Keep the oscillator aligned with the bars until the next evaluation
        self.rsi.push(None);
        if self.rsi.len() > self.bars.len() {
            let excess = self.rsi.len() - self.bars.len();
            self.rsi.drain(..excess);
        }

        self.detect_divergence(DIVERGENCE_LOOKBACK, EXTREMA_ORDER)
    }

    /// Evaluate bearish divergence on the current series
    pub fn detect_divergence(&mut self, lookback: usize, order: usize) -> Option<Signal> {
        if self.bars.len() < MIN_BARS {
            return None;
        }

        let closes = self.closes();
        self.rsi = rsi(&closes, RSI_PERIOD);

        let extrema = self.extrema(&closes, order);
        debug!(
            "Extrema: {} price highs, {} price lows, {} rsi highs, {} rsi lows",
            extrema.price_highs.len(),
            extrema.price_lows.len(),
            extrema.rsi_highs.len(),
            extrema.rsi_lows.len()
        );

        let [.., p1, p2] = extrema.price_highs[..] else {
            return None;
        };
        let [.., r1, r2] = extrema.rsi_highs[..] else {
            return None;
        };

        let price1 = closes[p1];
        let price2 = closes[p2];
        let (Some(rsi1), Some(rsi2)) = (self.rsi[r1], self.rsi[r2]) else {
            return None;
        };

        if p2 - p1 <= lookback && price2 > price1 && rsi2 < rsi1 {
            let timestamp = self.bars.back()?.close_time;
            info!(
                "Bearish divergence: price {:.4} -> {:.4}, rsi {:.2} -> {:.2}",
                price1, price2, rsi1, rsi2
            );
            return Some(Signal::BearishDivergence {
                price1,
                price2,
                rsi1,
                rsi2,
                timestamp,
            });
        }

        None
    }

    /// Local highs and lows of price and RSI with symmetric order `order`
    pub fn extrema(&self, closes: &[f64], order: usize) -> Extrema {
        let prices = defined(closes);
        Extrema {
            price_highs: local_maxima(&prices, order),
            price_lows: local_minima(&prices, order),
            rsi_highs: local_maxima(&self.rsi, order),
            rsi_lows: local_minima(&self.rsi, order),
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Oscillator values as of the last evaluation, one per bar
    pub fn rsi_series(&self) -> &[Option<f64>] {
        &self.rsi
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn feed(detector: &mut RsiDivergenceDetector, closes: &[f64]) -> Vec<Option<Signal>> {
        let t0 = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                detector.update(PriceBar::new(t0 + Duration::minutes(15 * i as i64), *c))
            })
            .collect()
    }

    /// Sharp rally to 116 at bar 37, pullback, then a slow grind to 117 at bar 51
    /// and a sell-off. The second high is higher but reached on weaker momentum.
    fn divergence_series() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 101.0 } else { 100.0 })
            .collect();
        let mut x = 100.0;
        for (n, step) in [(8, 2.0), (6, -1.5), (8, 1.25), (8, -3.0)] {
            for _ in 0..n {
                x += step;
                closes.push(x);
            }
        }
        closes
    }

    #[test]
    fn test_bearish_divergence_fires() {
        let closes = divergence_series();
        assert_eq!(closes.len(), 60);
        assert_eq!(closes[37], 116.0);
        assert_eq!(closes[51], 117.0);

        let mut detector = RsiDivergenceDetector::new();
        let signals = feed(&mut detector, &closes);

        assert!(signals[..51].iter().all(|s| s.is_none()));
        match signals.last().unwrap() {
            Some(Signal::BearishDivergence {
                price1,
                price2,
                rsi1,
                rsi2,
                ..
            }) => {
                assert_eq!(*price1, 116.0);
                assert_eq!(*price2, 117.0);
                assert!((rsi1 - 79.96).abs() < 0.01);
                assert!((rsi2 - 70.77).abs() < 0.01);
                assert!(rsi2 < rsi1);
            }
            other => panic!("expected bearish_divergence, got {:?}", other),
        }

        let extrema = detector.extrema(&detector.closes(), EXTREMA_ORDER);
        assert_eq!(extrema.rsi_highs, vec![37, 51]);
        assert_eq!(&extrema.price_highs[extrema.price_highs.len() - 2..], &[37, 51]);
    }

    #[test]
    fn test_divergence_timestamp_is_latest_bar() {
        let closes = divergence_series();
        let mut detector = RsiDivergenceDetector::new();
        let t0 = Utc::now();
        let mut last = None;
        for (i, c) in closes.iter().enumerate() {
            last = detector.update(PriceBar::new(t0 + Duration::minutes(i as i64), *c));
        }

        match last {
            Some(Signal::BearishDivergence { timestamp, .. }) => {
                assert_eq!(timestamp, t0 + Duration::minutes(59));
            }
            other => panic!("expected bearish_divergence, got {:?}", other),
        }
    }

    #[test]
    fn test_divergence_beyond_lookback_is_ignored() {
        let closes = divergence_series();
        let mut detector = RsiDivergenceDetector::new();
        feed(&mut detector, &closes);

        // Highs at 37 and 51 are 14 bars apart
        assert!(detector.detect_divergence(13, EXTREMA_ORDER).is_none());
        assert!(detector.detect_divergence(14, EXTREMA_ORDER).is_some());
    }

    #[test]
    fn test_bar_cap() {
        let mut detector = RsiDivergenceDetector::new();
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + (i % 7) as f64).collect();
        feed(&mut detector, &closes);

        assert_eq!(detector.len(), MAX_BARS);
        assert_eq!(detector.rsi_series().len(), MAX_BARS);
        assert_eq!(detector.closes()[0], closes[50]);
    }

    #[test]
    fn test_insufficient_history_never_fires() {
        let mut detector = RsiDivergenceDetector::new();
        // Would qualify with enough bars; 49 is one short
        let closes: Vec<f64> = (0..49).map(|i| 100.0 + ((i % 10) as f64)).collect();
        let signals = feed(&mut detector, &closes);
        assert!(signals.iter().all(|s| s.is_none()));
        assert!(detector.rsi_series().iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_rsi_defined_from_fifteenth_bar() {
        let mut detector = RsiDivergenceDetector::new();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
        feed(&mut detector, &closes);

        let series = detector.rsi_series();
        assert!(series[..RSI_PERIOD].iter().all(|v| v.is_none()));
        assert!(series[RSI_PERIOD..].iter().all(|v| v.is_some()));
    }

    #[test]
    fn test_monotonic_rally_has_no_divergence() {
        let mut detector = RsiDivergenceDetector::new();
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let signals = feed(&mut detector, &closes);
        assert!(signals.iter().all(|s| s.is_none()));
    }
}

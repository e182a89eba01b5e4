//! Centralized indicator calculations for the detectors
//!
//! Series-in, series-out helpers. Positions that cannot be computed yet are `None`
//! so callers never have to reason about NaN.

// =============================================================================
// Relative Strength Index
// =============================================================================

/// Classic Wilder RSI over a close-price series.
///
/// The first `period` price changes are averaged with a simple mean, then gains
/// and losses are smoothed with `avg = (prev_avg * (period - 1) + x) / period`.
/// Output is `None` for indices `0..period` and defined from index `period` on,
/// i.e. once `period + 1` closes exist.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    let period_minus_one = (period - 1) as f64;
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * period_minus_one + gain) / period as f64;
        avg_loss = (avg_loss * period_minus_one + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let total = avg_gain + avg_loss;
    if !total.is_finite() {
        return None;
    }
    // A perfectly flat window reads as 0, not 50
    if total == 0.0 {
        return Some(0.0);
    }
    Some(100.0 * avg_gain / total)
}

// =============================================================================
// Local Extrema
// =============================================================================

/// Indices that are ≥ every value within `order` positions on both sides.
///
/// Neighbour positions past either end are clamped to the end, so the first and
/// last points compare against themselves on the clipped side. An undefined value
/// is never an extremum and fails any comparison made against it.
pub fn local_maxima(values: &[Option<f64>], order: usize) -> Vec<usize> {
    local_extrema(values, order, |a, b| a >= b)
}

/// Indices that are ≤ every value within `order` positions on both sides.
pub fn local_minima(values: &[Option<f64>], order: usize) -> Vec<usize> {
    local_extrema(values, order, |a, b| a <= b)
}

fn local_extrema<F>(values: &[Option<f64>], order: usize, keep: F) -> Vec<usize>
where
    F: Fn(f64, f64) -> bool,
{
    let len = values.len();
    if len == 0 || order == 0 {
        return Vec::new();
    }
    let last = len - 1;

    (0..len)
        .filter(|&i| {
            let Some(center) = values[i] else {
                return false;
            };
            (1..=order).all(|shift| {
                let after = values[(i + shift).min(last)];
                let before = values[i.saturating_sub(shift)];
                matches!(after, Some(v) if keep(center, v))
                    && matches!(before, Some(v) if keep(center, v))
            })
        })
        .collect()
}

/// Lift a plain series into the optional form the extrema helpers take
pub fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| if v.is_finite() { Some(*v) } else { None })
        .collect()
}

// =============================================================================
// Percentages
// =============================================================================

/// Percentage drop from `old` to `new`; `None` when `old` is zero or the result
/// is not a finite number.
pub fn drop_pct(old: f64, new: f64) -> Option<f64> {
    if old == 0.0 {
        return None;
    }
    let pct = (old - new) / old * 100.0;
    pct.is_finite().then_some(pct)
}

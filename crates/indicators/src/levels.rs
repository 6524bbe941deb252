use crate::PriceSeries;
use crate::error::{IndicatorError, check_period};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelParams {
    pub window: usize,
    pub threshold: f64,
}

impl Default for LevelParams {
    fn default() -> Self {
        Self { window: 20, threshold: 0.02 }
    }
}

/// Price levels found at local extremes, in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupportResistance {
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
}

impl SupportResistance {
    pub fn has_support_below(&self, price: f64) -> bool {
        self.support.iter().any(|&level| level < price)
    }

    pub fn has_resistance_above(&self, price: f64) -> bool {
        self.resistance.iter().any(|&level| level > price)
    }
}

/// `|a - b| / max(|a|, |b|)`, and 0 when both are 0.
pub fn relative_distance(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 { 0.0 } else { (a - b).abs() / scale }
}

/// Bar `i` in `[window, len - window)` is a resistance pivot when its high is
/// the maximum of `highs[i - window .. i + window)`, a support pivot when its
/// low is the minimum of the lows over the same range. A pivot becomes a level
/// only if it is farther than `threshold` from every level already accepted.
pub fn support_resistance(series: &PriceSeries, params: LevelParams) -> Result<SupportResistance, IndicatorError> {
    check_period("window", params.window)?;
    if !params.threshold.is_finite() || params.threshold < 0.0 {
        return Err(IndicatorError::InvalidParameter {
            name: "threshold",
            reason: format!("must be a non-negative number, got {}", params.threshold),
        });
    }

    let w = params.window;
    let (highs, lows) = (series.highs(), series.lows());
    let mut levels = SupportResistance::default();

    for i in w..series.len().saturating_sub(w) {
        let span = i - w..i + w;

        let max_high = highs[span.clone()].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if highs[i] == max_high {
            accept(&mut levels.resistance, highs[i], params.threshold);
        }

        let min_low = lows[span].iter().copied().fold(f64::INFINITY, f64::min);
        if lows[i] == min_low {
            accept(&mut levels.support, lows[i], params.threshold);
        }
    }

    tracing::debug!(
        window = w,
        support = levels.support.len(),
        resistance = levels.resistance.len(),
        "calculated support/resistance levels"
    );
    Ok(levels)
}

fn accept(levels: &mut Vec<f64>, candidate: f64, threshold: f64) {
    if levels.iter().all(|&level| relative_distance(level, candidate) > threshold) {
        levels.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ohlc_series;

    fn zigzag(len: usize, period: usize, amplitude: f64) -> PriceSeries {
        let bars: Vec<(f64, f64, f64)> = (0..len)
            .map(|i| {
                let phase = (i % period) as f64 / period as f64;
                let mid = 100.0 + amplitude * (phase * std::f64::consts::TAU).sin();
                (mid + 0.5, mid - 0.5, mid)
            })
            .collect();
        ohlc_series(&bars)
    }

    #[test]
    fn too_short_series_has_no_levels() {
        let levels = support_resistance(&zigzag(30, 10, 5.0), LevelParams::default()).unwrap();
        assert!(levels.support.is_empty());
        assert!(levels.resistance.is_empty());
    }

    #[test]
    fn repeated_extremes_collapse_into_one_level() {
        let levels = support_resistance(&zigzag(120, 10, 5.0), LevelParams { window: 3, threshold: 0.02 }).unwrap();
        assert_eq!(levels.resistance.len(), 1);
        assert_eq!(levels.support.len(), 1);
        assert!(levels.has_support_below(100.0));
        assert!(levels.has_resistance_above(100.0));
        assert!(!levels.has_resistance_above(200.0));
    }

    #[test]
    fn relative_distance_uses_larger_magnitude() {
        assert_eq!(relative_distance(100.0, 98.0), 0.02);
        assert_eq!(relative_distance(0.0, 0.0), 0.0);
    }
}

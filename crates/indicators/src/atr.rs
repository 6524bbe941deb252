use crate::PriceSeries;
use crate::error::IndicatorError;
use crate::moving_average::sma_of;

/// True range per bar. The first bar has no previous close, so it is `high - low`.
pub fn true_range(series: &PriceSeries) -> Vec<f64> {
    let (highs, lows, closes) = (series.highs(), series.lows(), series.closes());
    (0..series.len())
        .map(|i| {
            let range = highs[i] - lows[i];
            if i == 0 {
                return range;
            }
            let prev_close = closes[i - 1];
            range
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs())
        })
        .collect()
}

/// Rolling mean of the true range.
pub fn atr(series: &PriceSeries, period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let out = sma_of(&true_range(series), period)?;
    tracing::debug!(period, "calculated ATR");
    Ok(out)
}

use crate::error::StrategyError;
use configuration::ConfluenceParams;
use indicators::{PriceSeries, ema, latest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Uptrend,
    Downtrend,
    Neutral,
}

/// UPTREND when fast > mid > slow strictly, DOWNTREND when fast < mid < slow
/// strictly, NEUTRAL otherwise (ties included).
pub fn classify_values(fast: f64, mid: f64, slow: f64) -> Trend {
    if fast > mid && mid > slow {
        Trend::Uptrend
    } else if fast < mid && mid < slow {
        Trend::Downtrend
    } else {
        Trend::Neutral
    }
}

/// Classifies the trend at the last bar. A series shorter than the slow
/// period is NEUTRAL.
pub fn classify(series: &PriceSeries, params: &ConfluenceParams) -> Result<Trend, StrategyError> {
    if series.len() < params.trend_slow {
        tracing::debug!(bars = series.len(), needed = params.trend_slow, "not enough bars for trend");
        return Ok(Trend::Neutral);
    }
    let fast = latest(&ema(series, params.trend_fast)?);
    let mid = latest(&ema(series, params.trend_mid)?);
    let slow = latest(&ema(series, params.trend_slow)?);

    Ok(match (fast, mid, slow) {
        (Some(f), Some(m), Some(s)) => classify_values(f, m, s),
        _ => Trend::Neutral,
    })
}

use crate::PriceSeries;
use crate::error::{IndicatorError, check_period};
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};

/// EMA of the closes. Seeded with the first close, so defined at every index.
pub fn ema(series: &PriceSeries, period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let out = ema_of(series.closes(), period)?;
    tracing::debug!(period, len = out.len(), "calculated EMA");
    Ok(out)
}

/// EMA over an arbitrary slice: `α = 2/(period+1)`, `EMA[0] = values[0]`.
pub fn ema_of(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    check_period("period", period)?;
    let mut ema = ExponentialMovingAverage::new(period).map_err(invalid_period)?;
    Ok(values.iter().map(|&v| Some(ema.next(v))).collect())
}

/// SMA of the closes. Undefined until `period` closes are available.
pub fn sma(series: &PriceSeries, period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let out = sma_of(series.closes(), period)?;
    tracing::debug!(period, len = out.len(), "calculated SMA");
    Ok(out)
}

/// Trailing mean over `period` values. The running sum can leave rounding
/// residue where the exact mean is zero.
pub fn sma_of(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    check_period("period", period)?;
    let mut sma = SimpleMovingAverage::new(period).map_err(invalid_period)?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let mean = sma.next(v);
            (i + 1 >= period).then_some(mean)
        })
        .collect())
}

fn invalid_period(e: ta::errors::TaError) -> IndicatorError {
    IndicatorError::InvalidParameter {
        name: "period",
        reason: format!("{e:?}"),
    }
}

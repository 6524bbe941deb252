use crate::error::IndicatorError;
use chrono::{DateTime, Utc};
use core_types::{PriceBar, RawBar};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// A validated, strictly time-ordered OHLCV series in `f64`.
///
/// Every indicator in this crate reads from a `PriceSeries`, so the checks
/// below run once per evaluation rather than once per indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    timestamps: Vec<DateTime<Utc>>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl PriceSeries {
    /// Builds a series from complete bars. Timestamps must be strictly ascending.
    pub fn from_bars(bars: &[PriceBar]) -> Result<Self, IndicatorError> {
        let mut series = Self {
            timestamps: Vec::with_capacity(bars.len()),
            open: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };

        for (i, bar) in bars.iter().enumerate() {
            if let Some(prev) = series.timestamps.last() {
                if bar.timestamp <= *prev {
                    return Err(IndicatorError::Validation(format!(
                        "bar {i} at {} is not after {prev}",
                        bar.timestamp
                    )));
                }
            }
            series.timestamps.push(bar.timestamp);
            series.open.push(to_finite(bar.open, i, "open")?);
            series.high.push(to_finite(bar.high, i, "high")?);
            series.low.push(to_finite(bar.low, i, "low")?);
            series.close.push(to_finite(bar.close, i, "close")?);
            series.volume.push(to_finite(bar.volume, i, "volume")?);
        }

        Ok(series)
    }

    /// Builds a series straight from broker records, rejecting any record with missing fields.
    pub fn from_raw(raw: Vec<RawBar>) -> Result<Self, IndicatorError> {
        let bars = raw
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                PriceBar::try_from(r).map_err(|e| IndicatorError::Validation(format!("bar {i}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_bars(&bars)
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn opens(&self) -> &[f64] {
        &self.open
    }

    pub fn highs(&self) -> &[f64] {
        &self.high
    }

    pub fn lows(&self) -> &[f64] {
        &self.low
    }

    pub fn closes(&self) -> &[f64] {
        &self.close
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volume
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied()
    }
}

fn to_finite(value: Decimal, index: usize, field: &str) -> Result<f64, IndicatorError> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| IndicatorError::Validation(format!("bar {index}: {field} {value} is not a finite number")))
}

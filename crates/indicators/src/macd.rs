use crate::PriceSeries;
use crate::error::IndicatorError;
use crate::moving_average::ema_of;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self { fast: 12, slow: 26, signal: 9 }
    }
}

/// MACD line, signal line and histogram, index-aligned with the input series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Macd {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl Macd {
    /// Line and signal at the last bar, when both are defined.
    pub fn latest(&self) -> Option<(f64, f64)> {
        Some((self.line.last().copied()??, self.signal.last().copied()??))
    }
}

pub fn macd(series: &PriceSeries, params: MacdParams) -> Result<Macd, IndicatorError> {
    let fast = ema_of(series.closes(), params.fast)?;
    let slow = ema_of(series.closes(), params.slow)?;

    let line: Vec<Option<f64>> = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // EMA seeded at the first defined line value.
    let first_defined = line.iter().position(Option::is_some).unwrap_or(line.len());
    let defined: Vec<f64> = line[first_defined..].iter().flatten().copied().collect();
    let mut signal = vec![None; first_defined];
    signal.extend(ema_of(&defined, params.signal)?);

    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();

    tracing::debug!(fast = params.fast, slow = params.slow, signal = params.signal, "calculated MACD");
    Ok(Macd { line, signal, histogram })
}

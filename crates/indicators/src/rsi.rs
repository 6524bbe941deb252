//! RSI over a simple rolling mean of gains and losses.
//!
//! RSI = 100 · avg_gain / (avg_gain + avg_loss), exactly 100 when avg_loss is 0.
//! Needs `period` close-to-close deltas, so the first `period` indices are undefined.

use crate::PriceSeries;
use crate::error::{IndicatorError, check_period};
use crate::moving_average::sma_of;

/// Mean losses below this are running-sum residue of an all-gain window.
const ZERO_LOSS: f64 = 1e-9;

pub fn rsi(series: &PriceSeries, period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    check_period("period", period)?;
    let closes = series.closes();
    if closes.is_empty() {
        return Ok(Vec::new());
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = closes
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let avg_gain = sma_of(&gains, period)?;
    let avg_loss = sma_of(&losses, period)?;

    // Delta j ends at close j + 1.
    let mut out = Vec::with_capacity(closes.len());
    out.push(None);
    out.extend(avg_gain.into_iter().zip(avg_loss).map(|(gain, loss)| match (gain, loss) {
        (Some(_), Some(loss)) if loss < ZERO_LOSS => Some(100.0),
        (Some(gain), Some(loss)) => Some(100.0 * gain / (gain + loss)),
        _ => None,
    }));

    tracing::debug!(period, len = out.len(), "calculated RSI");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::series;
    use approx::assert_relative_eq;

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let out = rsi(&series(&closes), 14).unwrap();
        assert_eq!(out.len(), 20);
        assert!(out[..14].iter().all(Option::is_none));
        assert!(out[14..].iter().all(Option::is_some));
    }

    #[test]
    fn rsi_all_gains_is_exactly_100() {
        let closes: Vec<f64> = (0..16).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&series(&closes), 14).unwrap();
        assert_eq!(out[15], Some(100.0));
    }

    #[test]
    fn gains_after_losses_reach_exactly_100() {
        // Losses of 0.3 and 0.7 leave the window before the last reading.
        let mut closes = vec![2000.0, 1999.7, 1999.0];
        closes.extend((1..=14).map(|i| 1999.0 + i as f64 * 0.1));
        let out = rsi(&series(&closes), 14).unwrap();
        assert_eq!(out[16], Some(100.0));
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let closes: Vec<f64> = (0..16).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&series(&closes), 14).unwrap();
        assert_relative_eq!(out[15].unwrap(), 0.0);
    }

    #[test]
    fn rsi_uses_simple_means() {
        // deltas: +2, -1, +2, -1 -> gains 4/4, losses 2/4
        let out = rsi(&series(&[10.0, 12.0, 11.0, 13.0, 12.0]), 4).unwrap();
        assert_relative_eq!(out[4].unwrap(), 100.0 * 1.0 / 1.5, epsilon = 1e-9);
    }

    #[test]
    fn single_bar_is_undefined() {
        assert_eq!(rsi(&series(&[100.0]), 14).unwrap(), vec![None]);
    }
}

use crate::PriceSeries;
use crate::error::{IndicatorError, check_period};
use crate::moving_average::sma_of;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerParams {
    pub period: usize,
    pub std_dev: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self { period: 20, std_dev: 2.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bands at `middle ± k·σ`, where `middle` is the SMA and `σ` the sample
/// standard deviation of the same trailing window.
pub fn bollinger(series: &PriceSeries, params: BollingerParams) -> Result<BollingerBands, IndicatorError> {
    check_period("period", params.period)?;
    if params.period < 2 {
        return Err(IndicatorError::InvalidParameter {
            name: "period",
            reason: "sample deviation needs at least 2 values".to_string(),
        });
    }
    if !params.std_dev.is_finite() || params.std_dev < 0.0 {
        return Err(IndicatorError::InvalidParameter {
            name: "std_dev",
            reason: format!("must be a non-negative number, got {}", params.std_dev),
        });
    }

    let closes = series.closes();
    let middle = sma_of(closes, params.period)?;
    let mut upper = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());

    for (i, mean) in middle.iter().enumerate() {
        match mean {
            Some(mean) => {
                let window = &closes[i + 1 - params.period..=i];
                let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>()
                    / (params.period - 1) as f64;
                let width = params.std_dev * variance.sqrt();
                upper.push(Some(mean + width));
                lower.push(Some(mean - width));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    tracing::debug!(period = params.period, k = params.std_dev, "calculated Bollinger Bands");
    Ok(BollingerBands { upper, middle, lower })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::series;
    use approx::assert_relative_eq;

    #[test]
    fn bands_use_sample_deviation() {
        // mean 3, sample variance 2.5
        let out = bollinger(&series(&[1.0, 2.0, 3.0, 4.0, 5.0]), BollingerParams { period: 5, std_dev: 2.0 }).unwrap();
        assert_eq!(out.middle[3], None);
        assert_relative_eq!(out.middle[4].unwrap(), 3.0);
        assert_relative_eq!(out.upper[4].unwrap(), 3.0 + 2.0 * 2.5_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(out.lower[4].unwrap(), 3.0 - 2.0 * 2.5_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn constant_series_collapses_bands() {
        let out = bollinger(&series(&[7.0; 25]), BollingerParams::default()).unwrap();
        assert_eq!(out.upper[24], Some(7.0));
        assert_eq!(out.lower[24], Some(7.0));
    }

    #[test]
    fn negative_width_is_rejected() {
        let params = BollingerParams { period: 20, std_dev: -1.0 };
        assert!(matches!(
            bollinger(&series(&[1.0]), params),
            Err(IndicatorError::InvalidParameter { name: "std_dev", .. })
        ));
    }
}

//! Technical indicators over a validated [`PriceSeries`].
//!
//! Every function is pure. Outputs are index-aligned with the input series;
//! `None` marks positions where the indicator is not yet defined.

pub mod atr;
pub mod bollinger;
pub mod error;
pub mod levels;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod series;
pub mod set;

pub use atr::{atr, true_range};
pub use bollinger::{BollingerBands, BollingerParams, bollinger};
pub use error::IndicatorError;
pub use levels::{LevelParams, SupportResistance, relative_distance, support_resistance};
pub use macd::{Macd, MacdParams, macd};
pub use moving_average::{ema, ema_of, sma, sma_of};
pub use rsi::rsi;
pub use series::PriceSeries;
pub use set::{IndicatorRequest, IndicatorSet};

/// The value at the last index, if defined.
pub fn latest(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}

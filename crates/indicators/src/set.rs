use crate::bollinger::{BollingerBands, BollingerParams, bollinger};
use crate::error::IndicatorError;
use crate::levels::{LevelParams, SupportResistance, support_resistance};
use crate::macd::{Macd, MacdParams, macd};
use crate::{PriceSeries, atr, ema, rsi, sma};
use std::collections::BTreeMap;

/// Which indicators to compute, and with what parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorRequest {
    pub ema_periods: Vec<usize>,
    pub sma_periods: Vec<usize>,
    pub rsi_period: Option<usize>,
    pub macd: Option<MacdParams>,
    pub bollinger: Option<BollingerParams>,
    pub atr_period: Option<usize>,
    pub levels: Option<LevelParams>,
}

/// Every requested indicator for one series, computed in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    pub ema: BTreeMap<usize, Vec<Option<f64>>>,
    pub sma: BTreeMap<usize, Vec<Option<f64>>>,
    pub rsi: Option<Vec<Option<f64>>>,
    pub macd: Option<Macd>,
    pub bollinger: Option<BollingerBands>,
    pub atr: Option<Vec<Option<f64>>>,
    pub levels: Option<SupportResistance>,
}

impl IndicatorSet {
    pub fn compute(series: &PriceSeries, request: &IndicatorRequest) -> Result<Self, IndicatorError> {
        let mut set = IndicatorSet::default();
        for &period in &request.ema_periods {
            set.ema.insert(period, ema(series, period)?);
        }
        for &period in &request.sma_periods {
            set.sma.insert(period, sma(series, period)?);
        }
        set.rsi = request.rsi_period.map(|p| rsi(series, p)).transpose()?;
        set.macd = request.macd.map(|p| macd(series, p)).transpose()?;
        set.bollinger = request.bollinger.map(|p| bollinger(series, p)).transpose()?;
        set.atr = request.atr_period.map(|p| atr(series, p)).transpose()?;
        set.levels = request.levels.map(|p| support_resistance(series, p)).transpose()?;

        tracing::debug!(bars = series.len(), "calculated indicator set");
        Ok(set)
    }

    /// Last EMA value for `period`, if it was requested and is defined.
    pub fn latest_ema(&self, period: usize) -> Option<f64> {
        self.ema.get(&period).and_then(|v| crate::latest(v))
    }

    pub fn latest_rsi(&self) -> Option<f64> {
        self.rsi.as_deref().and_then(crate::latest)
    }

    pub fn latest_bb_middle(&self) -> Option<f64> {
        self.bollinger.as_ref().and_then(|bb| crate::latest(&bb.middle))
    }
}

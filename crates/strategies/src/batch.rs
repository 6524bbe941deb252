use crate::SignalStrategy;
use crate::error::StrategyError;
use crate::signal::{EntryDecision, IndicatorSnapshot};
use core_types::{CloseReason, OrderSide, Position, StrategyConfig};
use indicators::{IndicatorRequest, IndicatorSet, PriceSeries};

/// The coarse RSI + fast/slow EMA rule used by the multi-strategy loop.
///
/// BUY when RSI is below oversold and the fast EMA is above the slow one;
/// SELL when RSI is above overbought and the fast EMA is below the slow one.
/// There is no indicator exit: positions close on their stop or target.
pub struct BatchStrategy {
    fast_ema: usize,
    slow_ema: usize,
    rsi_period: usize,
    overbought: f64,
    oversold: f64,
}

impl BatchStrategy {
    pub fn new(config: &StrategyConfig) -> Result<Self, StrategyError> {
        if config.fast_ema == 0 || config.fast_ema >= config.slow_ema {
            return Err(StrategyError::InvalidParameters(format!(
                "fast EMA ({}) must be positive and shorter than slow EMA ({})",
                config.fast_ema, config.slow_ema
            )));
        }
        if config.rsi_period == 0 {
            return Err(StrategyError::InvalidParameters("RSI period must be at least 1".to_string()));
        }
        Ok(Self {
            fast_ema: config.fast_ema,
            slow_ema: config.slow_ema,
            rsi_period: config.rsi_period,
            overbought: config.rsi_overbought,
            oversold: config.rsi_oversold,
        })
    }

    pub fn decide(&self, snapshot: &IndicatorSnapshot) -> Option<OrderSide> {
        let (Some(rsi), Some(fast), Some(slow)) = (snapshot.rsi, snapshot.fast_ema, snapshot.slow_ema) else {
            return None;
        };
        if rsi < self.oversold && fast > slow {
            Some(OrderSide::Buy)
        } else if rsi > self.overbought && fast < slow {
            Some(OrderSide::Sell)
        } else {
            None
        }
    }
}

impl SignalStrategy for BatchStrategy {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn evaluate_entry(&self, series: &PriceSeries) -> Result<EntryDecision, StrategyError> {
        let request = IndicatorRequest {
            ema_periods: vec![self.fast_ema, self.slow_ema],
            rsi_period: Some(self.rsi_period),
            ..Default::default()
        };
        let set = IndicatorSet::compute(series, &request)?;
        let snapshot = IndicatorSnapshot {
            close: series.last_close(),
            rsi: set.latest_rsi(),
            fast_ema: set.latest_ema(self.fast_ema),
            slow_ema: set.latest_ema(self.slow_ema),
            ..Default::default()
        };
        let side = self.decide(&snapshot);
        Ok(EntryDecision::new(side, snapshot))
    }

    fn evaluate_exit(&self, _series: &PriceSeries, _position: &Position) -> Result<Option<CloseReason>, StrategyError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, open_position, series, zigzag_uptrend};
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn zigzag_uptrend_below_oversold_buys() {
        let mut cfg = config();
        cfg.rsi_oversold = 90.0;
        cfg.rsi_overbought = 95.0;
        let strategy = BatchStrategy::new(&cfg).unwrap();

        let decision = strategy.evaluate_entry(&zigzag_uptrend(40)).unwrap();
        assert_relative_eq!(decision.snapshot.rsi.unwrap(), 250.0 / 3.0, epsilon = 1e-9);
        assert!(decision.snapshot.fast_ema > decision.snapshot.slow_ema);
        assert_eq!(decision.side, Some(OrderSide::Buy));
    }

    #[test]
    fn default_thresholds_give_no_signal_on_same_series() {
        let strategy = BatchStrategy::new(&config()).unwrap();
        let decision = strategy.evaluate_entry(&zigzag_uptrend(40)).unwrap();
        assert_eq!(decision.side, None);
    }

    #[test]
    fn falling_and_overbought_sells() {
        let strategy = BatchStrategy::new(&config()).unwrap();
        let snapshot = IndicatorSnapshot {
            rsi: Some(80.0),
            fast_ema: Some(1990.0),
            slow_ema: Some(2000.0),
            ..Default::default()
        };
        assert_eq!(strategy.decide(&snapshot), Some(OrderSide::Sell));
    }

    #[test]
    fn short_series_gives_no_signal() {
        let strategy = BatchStrategy::new(&config()).unwrap();
        let decision = strategy.evaluate_entry(&series(&[2000.0, 2001.0])).unwrap();
        assert_eq!(decision.side, None);
        assert_eq!(decision.snapshot.rsi, None);
    }

    #[test]
    fn batch_has_no_indicator_exit() {
        let strategy = BatchStrategy::new(&config()).unwrap();
        let position = open_position(OrderSide::Buy, dec!(2000));
        assert_eq!(strategy.evaluate_exit(&zigzag_uptrend(40), &position).unwrap(), None);
    }
}

use crate::error::StrategyError;
use crate::signal::{EntryDecision, IndicatorSnapshot};
use crate::trend::{self, Trend};
use crate::{SignalStrategy, decimal_to_f64};
use configuration::ConfluenceParams;
use core_types::{CloseReason, OrderSide, Position};
use indicators::{
    BollingerParams, IndicatorRequest, IndicatorSet, LevelParams, MacdParams, PriceSeries, latest,
};
use rust_decimal::Decimal;

/// The full confluence rule set: trend, RSI, MACD, Bollinger middle band and
/// support/resistance must all agree before an entry is taken.
///
/// Exits are a second gate on top of the broker-held bracket: RSI extreme,
/// MACD cross against the position, or the stop-loss distance reached.
pub struct ConfluenceStrategy {
    params: ConfluenceParams,
    stop_loss_pct: f64,
}

impl ConfluenceStrategy {
    pub fn new(params: ConfluenceParams, stop_loss_pct: Decimal) -> Result<Self, StrategyError> {
        params
            .validate()
            .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
        let stop_loss_pct = decimal_to_f64(stop_loss_pct, "stop_loss_pct")?;
        if stop_loss_pct <= 0.0 {
            return Err(StrategyError::InvalidParameters(format!(
                "stop_loss_pct must be positive, got {stop_loss_pct}"
            )));
        }
        Ok(Self { params, stop_loss_pct })
    }

    fn request(&self) -> IndicatorRequest {
        let p = &self.params;
        IndicatorRequest {
            rsi_period: Some(p.rsi_period),
            macd: Some(MacdParams {
                fast: p.macd_fast,
                slow: p.macd_slow,
                signal: p.macd_signal,
            }),
            bollinger: Some(BollingerParams {
                period: p.bb_period,
                std_dev: p.bb_std_dev,
            }),
            levels: Some(LevelParams {
                window: p.sr_window,
                threshold: p.sr_threshold,
            }),
            ..Default::default()
        }
    }

    /// Computes every value the entry and exit rules read, at the last bar.
    pub fn snapshot(&self, series: &PriceSeries) -> Result<IndicatorSnapshot, StrategyError> {
        let close = series.last_close();
        let trend = trend::classify(series, &self.params)?;
        let set = IndicatorSet::compute(series, &self.request())?;

        let (macd_line, macd_signal) = match set.macd.as_ref().and_then(|m| m.latest()) {
            Some((line, signal)) => (Some(line), Some(signal)),
            None => (None, None),
        };
        let (support_below, resistance_above) = match (&set.levels, close) {
            (Some(levels), Some(c)) => (Some(levels.has_support_below(c)), Some(levels.has_resistance_above(c))),
            _ => (None, None),
        };

        Ok(IndicatorSnapshot {
            close,
            trend: Some(trend),
            rsi: set.rsi.as_deref().and_then(latest),
            fast_ema: None,
            slow_ema: None,
            macd_line,
            macd_signal,
            bb_middle: set.latest_bb_middle(),
            support_below,
            resistance_above,
        })
    }
}

/// BUY iff UPTREND, RSI below overbought, MACD above signal, close above the
/// Bollinger middle and a support level below close. SELL is the mirror.
/// Any undefined input means no signal.
pub fn decide_entry(snapshot: &IndicatorSnapshot, params: &ConfluenceParams) -> Option<OrderSide> {
    let (Some(close), Some(trend), Some(rsi), Some(line), Some(signal), Some(middle), Some(support), Some(resistance)) = (
        snapshot.close,
        snapshot.trend,
        snapshot.rsi,
        snapshot.macd_line,
        snapshot.macd_signal,
        snapshot.bb_middle,
        snapshot.support_below,
        snapshot.resistance_above,
    ) else {
        return None;
    };

    if trend == Trend::Uptrend && rsi < params.rsi_overbought && line > signal && close > middle && support {
        Some(OrderSide::Buy)
    } else if trend == Trend::Downtrend && rsi > params.rsi_oversold && line < signal && close < middle && resistance {
        Some(OrderSide::Sell)
    } else {
        None
    }
}

/// Exit rule for an open position. Conditions whose indicator is undefined
/// do not fire; the stop-distance check only needs the close.
pub fn decide_exit(
    snapshot: &IndicatorSnapshot,
    side: OrderSide,
    entry_price: f64,
    params: &ConfluenceParams,
    stop_loss_pct: f64,
) -> Option<CloseReason> {
    let close = snapshot.close?;
    let macd = snapshot.macd_line.zip(snapshot.macd_signal);

    let should_close = match side {
        OrderSide::Buy => {
            snapshot.rsi.is_some_and(|r| r > params.rsi_overbought)
                || macd.is_some_and(|(line, signal)| line < signal)
                || close <= entry_price * (1.0 - stop_loss_pct / 100.0)
        }
        OrderSide::Sell => {
            snapshot.rsi.is_some_and(|r| r < params.rsi_oversold)
                || macd.is_some_and(|(line, signal)| line > signal)
                || close >= entry_price * (1.0 + stop_loss_pct / 100.0)
        }
    };
    should_close.then_some(CloseReason::Signal)
}

impl SignalStrategy for ConfluenceStrategy {
    fn name(&self) -> &'static str {
        "confluence"
    }

    fn evaluate_entry(&self, series: &PriceSeries) -> Result<EntryDecision, StrategyError> {
        let snapshot = self.snapshot(series)?;
        let side = decide_entry(&snapshot, &self.params);
        Ok(EntryDecision::new(side, snapshot))
    }

    fn evaluate_exit(&self, series: &PriceSeries, position: &Position) -> Result<Option<CloseReason>, StrategyError> {
        let snapshot = self.snapshot(series)?;
        let entry = decimal_to_f64(position.entry_price, "entry_price")?;
        let reason = decide_exit(&snapshot, position.side, entry, &self.params, self.stop_loss_pct);
        if reason.is_some() {
            tracing::info!(position_id = %position.id, rsi = ?snapshot.rsi, close = ?snapshot.close, "confluence exit triggered");
        }
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_position, series};
    use rust_decimal_macros::dec;

    fn bullish_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: Some(2010.0),
            trend: Some(Trend::Uptrend),
            rsi: Some(45.0),
            macd_line: Some(1.5),
            macd_signal: Some(0.9),
            bb_middle: Some(2000.0),
            support_below: Some(true),
            resistance_above: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn all_conditions_agree_gives_buy() {
        assert_eq!(
            decide_entry(&bullish_snapshot(), &ConfluenceParams::default()),
            Some(OrderSide::Buy)
        );
    }

    #[test]
    fn any_failing_condition_blocks_entry() {
        let params = ConfluenceParams::default();

        let mut s = bullish_snapshot();
        s.rsi = Some(75.0);
        assert_eq!(decide_entry(&s, &params), None);

        let mut s = bullish_snapshot();
        s.support_below = Some(false);
        assert_eq!(decide_entry(&s, &params), None);

        let mut s = bullish_snapshot();
        s.trend = Some(Trend::Neutral);
        assert_eq!(decide_entry(&s, &params), None);

        let mut s = bullish_snapshot();
        s.bb_middle = None;
        assert_eq!(decide_entry(&s, &params), None);
    }

    #[test]
    fn mirrored_conditions_give_sell() {
        let s = IndicatorSnapshot {
            close: Some(1990.0),
            trend: Some(Trend::Downtrend),
            rsi: Some(55.0),
            macd_line: Some(-1.0),
            macd_signal: Some(-0.2),
            bb_middle: Some(2000.0),
            support_below: Some(false),
            resistance_above: Some(true),
            ..Default::default()
        };
        assert_eq!(decide_entry(&s, &ConfluenceParams::default()), Some(OrderSide::Sell));
    }

    #[test]
    fn buy_exit_on_stop_distance() {
        let params = ConfluenceParams::default();
        let mut s = bullish_snapshot();
        s.close = Some(1969.0);
        assert_eq!(decide_exit(&s, OrderSide::Buy, 2000.0, &params, 1.5), Some(CloseReason::Signal));
        s.close = Some(1990.0);
        assert_eq!(decide_exit(&s, OrderSide::Buy, 2000.0, &params, 1.5), None);
    }

    #[test]
    fn sell_exit_on_oversold_rsi() {
        let params = ConfluenceParams::default();
        let s = IndicatorSnapshot {
            close: Some(1980.0),
            rsi: Some(25.0),
            ..Default::default()
        };
        assert_eq!(decide_exit(&s, OrderSide::Sell, 2000.0, &params, 1.5), Some(CloseReason::Signal));
    }

    #[test]
    fn monotonic_rise_is_overbought() {
        let closes: Vec<f64> = (0..80).map(|i| 2000.0 + i as f64).collect();
        let s = series(&closes);
        let strategy = ConfluenceStrategy::new(ConfluenceParams::default(), dec!(1.5)).unwrap();

        let entry = strategy.evaluate_entry(&s).unwrap();
        assert_eq!(entry.snapshot.rsi, Some(100.0));
        assert_eq!(entry.snapshot.trend, Some(Trend::Uptrend));
        assert_eq!(entry.side, None);

        let position = open_position(OrderSide::Buy, dec!(2050));
        assert_eq!(strategy.evaluate_exit(&s, &position).unwrap(), Some(CloseReason::Signal));
    }

    /// Steady climb, a sharp dip that leaves support behind, then a choppy
    /// recovery (+6, +6, -9) over 60 hourly bars.
    fn pullback_recovery() -> Vec<f64> {
        let mut closes = vec![2000.0];
        for i in 1..60 {
            let step = match i {
                1..=25 => 2.0,
                26..=30 => -6.0,
                _ if i % 3 == 0 => -9.0,
                _ => 6.0,
            };
            closes.push(closes[i - 1] + step);
        }
        closes
    }

    #[test]
    fn recovering_uptrend_gives_buy_from_real_bars() {
        let s = series(&pullback_recovery());
        let strategy = ConfluenceStrategy::new(ConfluenceParams::default(), dec!(1.5)).unwrap();

        let entry = strategy.evaluate_entry(&s).unwrap();
        let snapshot = &entry.snapshot;
        assert_eq!(snapshot.trend, Some(Trend::Uptrend));
        assert_eq!(snapshot.close, Some(2059.0));
        // Last 14 deltas: ten +6, four -9.
        approx::assert_relative_eq!(snapshot.rsi.unwrap(), 62.5, epsilon = 1e-9);
        approx::assert_relative_eq!(snapshot.bb_middle.unwrap(), 2044.75, epsilon = 1e-9);
        assert!(snapshot.macd_line.unwrap() > snapshot.macd_signal.unwrap());
        assert_eq!(snapshot.support_below, Some(true));
        assert_eq!(entry.side, Some(OrderSide::Buy));

        let position = open_position(OrderSide::Buy, dec!(2050));
        assert_eq!(strategy.evaluate_exit(&s, &position).unwrap(), None);
    }

    #[test]
    fn non_positive_stop_is_rejected() {
        assert!(ConfluenceStrategy::new(ConfluenceParams::default(), dec!(0)).is_err());
    }
}

//! # Bullion Signal Library
//!
//! Turns a validated price series into trading decisions. It defines the
//! `SignalStrategy` trait and its two implementations, one per signal
//! granularity.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** no knowledge of databases, brokers or execution. Depends on
//!   `core-types`, `indicators` and `configuration` only.
//! - **Stateless evaluation:** every call recomputes from the series it is given,
//!   so the engine can rebuild strategies each iteration without losing anything.
//!
//! ## Public API
//!
//! - `SignalStrategy`: the trait the engine evaluates.
//! - `create_strategy`: the factory that picks an implementation from a `StrategyConfig`.
//! - `BatchStrategy` / `ConfluenceStrategy`: the implementations.

pub mod batch;
pub mod confluence;
pub mod error;
pub mod factory;
pub mod signal;
pub mod trend;

pub use batch::BatchStrategy;
pub use confluence::ConfluenceStrategy;
pub use error::StrategyError;
pub use factory::create_strategy;
pub use signal::{EntryDecision, IndicatorSnapshot};
pub use trend::Trend;

use core_types::{CloseReason, Position};
use indicators::PriceSeries;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// The interface the engine loop evaluates strategies through.
///
/// The `Send + Sync` bounds let a boxed strategy be held across `.await`
/// points inside the engine task.
pub trait SignalStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Evaluated only when the strategy has no open position.
    fn evaluate_entry(&self, series: &PriceSeries) -> Result<EntryDecision, StrategyError>;

    /// Evaluated only while `position` is open.
    ///
    /// * `Ok(Some(reason))` - the position should be closed now.
    /// * `Ok(None)` - keep it open.
    fn evaluate_exit(&self, series: &PriceSeries, position: &Position) -> Result<Option<CloseReason>, StrategyError>;
}

pub(crate) fn decimal_to_f64(value: Decimal, what: &str) -> Result<f64, StrategyError> {
    value
        .to_f64()
        .ok_or_else(|| StrategyError::InvalidPosition(format!("{what} {value} does not fit in f64")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use core_types::{NewPosition, OrderSide, Position, PriceBar, SignalGranularity, StrategyConfig};
    use indicators::PriceSeries;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub fn series(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<PriceBar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let c = Decimal::try_from(c).unwrap();
                PriceBar {
                    timestamp: start + Duration::hours(i as i64),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: Decimal::ONE,
                }
            })
            .collect();
        PriceSeries::from_bars(&bars).unwrap()
    }

    /// `100 + i`, dipping by 1.5 on odd bars. With RSI(14) this sits at 83.3.
    pub fn zigzag_uptrend(len: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..len)
            .map(|i| 100.0 + i as f64 - if i % 2 == 1 { 1.5 } else { 0.0 })
            .collect();
        series(&closes)
    }

    pub fn config() -> StrategyConfig {
        StrategyConfig {
            id: 1,
            name: "gold".to_string(),
            symbol: "XAUUSD".to_string(),
            timeframe: "1h".to_string(),
            granularity: SignalGranularity::Batch,
            fast_ema: 5,
            slow_ema: 20,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            max_lot: dec!(0.1),
            stop_loss_pct: dec!(1.5),
            take_profit_pct: dec!(3),
            max_daily_loss: dec!(5),
            active: true,
        }
    }

    pub fn open_position(side: OrderSide, entry: Decimal) -> Position {
        let (stop, target) = match side {
            OrderSide::Buy => (entry - dec!(30), entry + dec!(60)),
            OrderSide::Sell => (entry + dec!(30), entry - dec!(60)),
        };
        Position::open(NewPosition {
            strategy_id: 1,
            symbol: "XAUUSD".to_string(),
            side,
            entry_price: entry,
            quantity: dec!(0.1),
            stop_loss: stop,
            take_profit: target,
            entry_time: Utc::now(),
        })
        .unwrap()
    }
}

use crate::trend::Trend;
use core_types::OrderSide;

/// The indicator values an evaluation looked at, kept so the decision can be
/// logged and explained afterwards. Fields a strategy does not use stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,
    pub trend: Option<Trend>,
    pub rsi: Option<f64>,
    pub fast_ema: Option<f64>,
    pub slow_ema: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_middle: Option<f64>,
    pub support_below: Option<bool>,
    pub resistance_above: Option<bool>,
}

/// Result of an entry evaluation: a side to open, or none.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDecision {
    pub side: Option<OrderSide>,
    pub snapshot: IndicatorSnapshot,
}

impl EntryDecision {
    pub fn new(side: Option<OrderSide>, snapshot: IndicatorSnapshot) -> Self {
        Self { side, snapshot }
    }

    pub fn no_signal(snapshot: IndicatorSnapshot) -> Self {
        Self { side: None, snapshot }
    }

    /// Emits the decision as one structured event.
    pub fn log(&self, strategy_id: i64, symbol: &str) {
        let s = &self.snapshot;
        tracing::info!(
            target: "trades",
            strategy_id,
            symbol,
            signal = self.side.map_or("NONE", |side| side.as_str()),
            close = ?s.close,
            trend = ?s.trend,
            rsi = ?s.rsi,
            fast_ema = ?s.fast_ema,
            slow_ema = ?s.slow_ema,
            macd_line = ?s.macd_line,
            macd_signal = ?s.macd_signal,
            bb_middle = ?s.bb_middle,
            "strategy evaluated"
        );
    }
}

use crate::enums::SignalGranularity;
use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A validated strategy definition, as the engine consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub timeframe: String,
    pub granularity: SignalGranularity,
    pub fast_ema: usize,
    pub slow_ema: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Per-trade lot cap.
    pub max_lot: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_daily_loss: Decimal,
    pub active: bool,
}

impl StrategyConfig {
    /// Checks every field the engine relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |msg: String| Err(CoreError::Configuration(format!("strategy '{}': {}", self.name, msg)));

        if self.name.trim().is_empty() {
            return Err(CoreError::Configuration("strategy name must not be empty".to_string()));
        }
        if self.symbol.trim().is_empty() {
            return fail("symbol must not be empty".to_string());
        }
        if self.timeframe.trim().is_empty() {
            return fail("timeframe must not be empty".to_string());
        }
        if self.fast_ema == 0 || self.slow_ema == 0 {
            return fail("EMA periods must be positive".to_string());
        }
        if self.fast_ema >= self.slow_ema {
            return fail(format!(
                "fast EMA period ({}) must be less than slow EMA period ({})",
                self.fast_ema, self.slow_ema
            ));
        }
        if self.rsi_period == 0 {
            return fail("RSI period must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return fail(format!(
                "RSI thresholds must satisfy 0 <= oversold ({}) < overbought ({}) <= 100",
                self.rsi_oversold, self.rsi_overbought
            ));
        }
        if self.max_lot <= Decimal::ZERO {
            return fail(format!("position size cap must be positive, got {}", self.max_lot));
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= Decimal::ONE_HUNDRED {
            return fail(format!("stop-loss % must be in (0, 100), got {}", self.stop_loss_pct));
        }
        if self.take_profit_pct <= Decimal::ZERO || self.take_profit_pct >= Decimal::ONE_HUNDRED {
            return fail(format!("take-profit % must be in (0, 100), got {}", self.take_profit_pct));
        }
        if self.max_daily_loss <= Decimal::ZERO {
            return fail(format!("max daily loss must be positive, got {}", self.max_daily_loss));
        }
        Ok(())
    }
}

/// A strategy row as persisted. Indicator columns are nullable in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub timeframe: String,
    pub granularity: String,
    pub fast_ema: Option<i64>,
    pub slow_ema: Option<i64>,
    pub rsi_period: Option<i64>,
    pub rsi_overbought: Option<f64>,
    pub rsi_oversold: Option<f64>,
    pub position_size: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
    pub max_daily_loss: Decimal,
    pub is_active: bool,
}

fn required<T>(value: Option<T>, field: &str, name: &str) -> Result<T, CoreError> {
    value.ok_or_else(|| {
        CoreError::Configuration(format!("strategy '{}': missing required field `{}`", name, field))
    })
}

fn period(value: i64, field: &str, name: &str) -> Result<usize, CoreError> {
    usize::try_from(value).map_err(|_| {
        CoreError::Configuration(format!("strategy '{}': `{}` must be non-negative, got {}", name, field, value))
    })
}

impl TryFrom<StrategyRecord> for StrategyConfig {
    type Error = CoreError;

    fn try_from(record: StrategyRecord) -> Result<Self, Self::Error> {
        let name = record.name.as_str();
        let config = StrategyConfig {
            id: record.id,
            granularity: record
                .granularity
                .parse()
                .map_err(|e: CoreError| CoreError::Configuration(format!("strategy '{}': {}", name, e)))?,
            fast_ema: period(required(record.fast_ema, "fast_ema", name)?, "fast_ema", name)?,
            slow_ema: period(required(record.slow_ema, "slow_ema", name)?, "slow_ema", name)?,
            rsi_period: period(required(record.rsi_period, "rsi_period", name)?, "rsi_period", name)?,
            rsi_overbought: required(record.rsi_overbought, "rsi_overbought", name)?,
            rsi_oversold: required(record.rsi_oversold, "rsi_oversold", name)?,
            max_lot: record.position_size,
            stop_loss_pct: record.stop_loss_percent,
            take_profit_pct: record.take_profit_percent,
            max_daily_loss: record.max_daily_loss,
            active: record.is_active,
            name: record.name,
            symbol: record.symbol,
            timeframe: record.timeframe,
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_overbought() -> f64 {
    70.0
}

fn default_oversold() -> f64 {
    30.0
}

/// Caller input for registering a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewStrategy {
    pub name: String,
    pub symbol: String,
    pub timeframe: String,
    #[serde(default)]
    pub granularity: SignalGranularity,
    pub fast_ema: usize,
    pub slow_ema: usize,
    pub rsi_period: usize,
    #[serde(default = "default_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_oversold")]
    pub rsi_oversold: f64,
    pub position_size: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
    pub max_daily_loss: Decimal,
}

impl NewStrategy {
    /// Builds the config this input would produce once the store assigns `id`.
    pub fn into_config(self, id: i64) -> Result<StrategyConfig, CoreError> {
        let config = StrategyConfig {
            id,
            name: self.name,
            symbol: self.symbol,
            timeframe: self.timeframe,
            granularity: self.granularity,
            fast_ema: self.fast_ema,
            slow_ema: self.slow_ema,
            rsi_period: self.rsi_period,
            rsi_overbought: self.rsi_overbought,
            rsi_oversold: self.rsi_oversold,
            max_lot: self.position_size,
            stop_loss_pct: self.stop_loss_percent,
            take_profit_pct: self.take_profit_percent,
            max_daily_loss: self.max_daily_loss,
            active: true,
        };
        config.validate()?;
        Ok(config)
    }
}

/// The fields a caller may change on an existing strategy.
///
/// There is no symbol field: open positions are keyed by (strategy, symbol).
/// Unknown keys are rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyUpdate {
    pub name: Option<String>,
    pub timeframe: Option<String>,
    pub granularity: Option<SignalGranularity>,
    pub fast_ema: Option<usize>,
    pub slow_ema: Option<usize>,
    pub rsi_period: Option<usize>,
    pub rsi_overbought: Option<f64>,
    pub rsi_oversold: Option<f64>,
    pub position_size: Option<Decimal>,
    pub stop_loss_percent: Option<Decimal>,
    pub take_profit_percent: Option<Decimal>,
    pub max_daily_loss: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl StrategyUpdate {
    pub fn is_empty(&self) -> bool {
        *self == StrategyUpdate::default()
    }

    /// Returns `current` with this update applied, validated as a whole.
    pub fn apply(&self, current: &StrategyConfig) -> Result<StrategyConfig, CoreError> {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(timeframe) = &self.timeframe {
            next.timeframe = timeframe.clone();
        }
        if let Some(granularity) = self.granularity {
            next.granularity = granularity;
        }
        if let Some(v) = self.fast_ema {
            next.fast_ema = v;
        }
        if let Some(v) = self.slow_ema {
            next.slow_ema = v;
        }
        if let Some(v) = self.rsi_period {
            next.rsi_period = v;
        }
        if let Some(v) = self.rsi_overbought {
            next.rsi_overbought = v;
        }
        if let Some(v) = self.rsi_oversold {
            next.rsi_oversold = v;
        }
        if let Some(v) = self.position_size {
            next.max_lot = v;
        }
        if let Some(v) = self.stop_loss_percent {
            next.stop_loss_pct = v;
        }
        if let Some(v) = self.take_profit_percent {
            next.take_profit_pct = v;
        }
        if let Some(v) = self.max_daily_loss {
            next.max_daily_loss = v;
        }
        if let Some(v) = self.is_active {
            next.active = v;
        }
        next.validate()?;
        Ok(next)
    }
}

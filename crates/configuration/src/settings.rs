use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSettings,
    pub broker: BrokerConfig,
    pub risk: RiskSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub signals: SignalSettings,
}

impl Config {
    /// Rejects combinations that would let the engine start in a broken state.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.engine.interval_secs == 0 {
            return fail("engine.interval_secs must be at least 1");
        }
        if self.engine.market_data_limit == 0 {
            return fail("engine.market_data_limit must be at least 1");
        }

        if self.broker.mode == BrokerMode::Live {
            let missing = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
            if missing(&self.broker.api_key) || missing(&self.broker.api_secret) {
                return fail("live broker mode requires broker.api_key and broker.api_secret");
            }
            if self.broker.base_url.trim().is_empty() {
                return fail("live broker mode requires broker.base_url");
            }
        }
        if self.broker.timeout_ms == 0 {
            return fail("broker.timeout_ms must be positive");
        }
        let retry = &self.broker.retry;
        if retry.max_attempts == 0 {
            return fail("broker.retry.max_attempts must be at least 1");
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return fail("broker.retry.base_delay_ms must not exceed max_delay_ms");
        }
        let sim = &self.broker.simulated;
        if sim.start_price <= Decimal::ZERO || sim.initial_balance < Decimal::ZERO {
            return fail("broker.simulated needs a positive start_price and non-negative balance");
        }
        if !(0.0..1.0).contains(&sim.volatility) {
            return fail("broker.simulated.volatility must be in [0, 1)");
        }

        if self.risk.max_weekly_loss <= Decimal::ZERO {
            return fail("risk.max_weekly_loss must be positive");
        }
        if !(-12..=14).contains(&self.risk.reference_utc_offset_hours) {
            return fail("risk.reference_utc_offset_hours must be within -12..=14");
        }
        if self.risk.lot_step <= Decimal::ZERO || self.risk.price_tick <= Decimal::ZERO {
            return fail("risk.lot_step and risk.price_tick must be positive");
        }

        if self.database.url.trim().is_empty() || self.database.max_connections == 0 {
            return fail("database.url must be set and max_connections at least 1");
        }

        self.signals.confluence.validate()
    }
}

/// Cadence and data-window settings for the engine loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Seconds between iterations.
    pub interval_secs: u64,
    /// Pause after a failed iteration before the loop resumes.
    pub cooldown_secs: u64,
    /// How many bars each strategy evaluation requests.
    pub market_data_limit: usize,
    /// The one instrument traded. Strategies on any other symbol are skipped.
    pub symbol: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            cooldown_secs: 5,
            market_data_limit: 100,
            symbol: "XAUUSD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    Live,
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub mode: BrokerMode,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Per-request timeout for the live client.
    pub timeout_ms: u64,
    pub retry: RetrySettings,
    pub simulated: SimulatedSettings,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mode: BrokerMode::Simulated,
            base_url: "https://api.puprime.com".to_string(),
            api_key: None,
            api_secret: None,
            timeout_ms: 10_000,
            retry: RetrySettings::default(),
            simulated: SimulatedSettings::default(),
        }
    }
}

/// Exponential backoff for transient broker failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Parameters for the in-memory broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedSettings {
    pub initial_balance: Decimal,
    /// Seed for the random-walk price feed. Same seed, same prices.
    pub seed: u64,
    pub start_price: Decimal,
    /// Per-bar standard deviation of the walk, as a fraction of price.
    pub volatility: f64,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            seed: 42,
            start_price: dec!(2000),
            volatility: 0.002,
        }
    }
}

/// Account-wide risk settings. Per-strategy limits live on the strategy itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Realized loss this week, per strategy, at which that strategy stops
    /// opening positions.
    pub max_weekly_loss: Decimal,
    /// Offset of the timezone that defines "today" and "this week".
    pub reference_utc_offset_hours: i32,
    /// Smallest tradable quantity increment.
    pub lot_step: Decimal,
    /// Smallest price increment for stop and target levels.
    pub price_tick: Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_weekly_loss: dec!(10),
            reference_utc_offset_hours: 0,
            lot_step: dec!(0.01),
            price_tick: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://bullion.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter for stdout when `RUST_LOG` is unset.
    pub level: String,
    /// Where `trading.log` and `error.log` are written.
    pub directory: PathBuf,
    /// Emit stdout as JSON lines instead of the human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub confluence: ConfluenceParams,
}

/// Parameters for the full confluence signal path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfluenceParams {
    pub trend_fast: usize,
    pub trend_mid: usize,
    pub trend_slow: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub sr_window: usize,
    pub sr_threshold: f64,
}

impl Default for ConfluenceParams {
    fn default() -> Self {
        Self {
            trend_fast: 9,
            trend_mid: 21,
            trend_slow: 50,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std_dev: 2.0,
            sr_window: 20,
            sr_threshold: 0.02,
        }
    }
}

impl ConfluenceParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(format!("signals.confluence: {msg}")));

        let periods = [
            self.trend_fast,
            self.trend_mid,
            self.trend_slow,
            self.rsi_period,
            self.macd_fast,
            self.macd_slow,
            self.macd_signal,
            self.bb_period,
            self.sr_window,
        ];
        if periods.contains(&0) {
            return fail("every period must be at least 1");
        }
        if !(self.trend_fast < self.trend_mid && self.trend_mid < self.trend_slow) {
            return fail("trend periods must be strictly increasing");
        }
        if self.macd_fast >= self.macd_slow {
            return fail("macd_fast must be shorter than macd_slow");
        }
        if !(0.0 <= self.rsi_oversold && self.rsi_oversold < self.rsi_overbought && self.rsi_overbought <= 100.0) {
            return fail("RSI thresholds must satisfy 0 <= oversold < overbought <= 100");
        }
        if self.bb_std_dev.is_nan() || self.bb_std_dev <= 0.0 || self.sr_threshold.is_nan() || self.sr_threshold < 0.0 {
            return fail("bb_std_dev must be positive and sr_threshold non-negative");
        }
        Ok(())
    }
}

use crate::error::RiskError;
use crate::window::RiskWindow;
use configuration::RiskSettings;
use core_types::{OrderSide, StrategyConfig};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Daily,
    Weekly,
}

impl LimitWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitWindow::Daily => "DAILY",
            LimitWindow::Weekly => "WEEKLY",
        }
    }
}

/// Which loss limit stopped trading, and by how much.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimitBreached {
    pub window: LimitWindow,
    pub loss: Decimal,
    pub limit: Decimal,
}

impl fmt::Display for RiskLimitBreached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loss {} reached limit {}",
            self.window.as_str().to_lowercase(),
            self.loss,
            self.limit
        )
    }
}

/// Outcome of the pre-trade gate. A block is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Allowed,
    Blocked(RiskLimitBreached),
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allowed)
    }
}

/// Bracket levels for a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPrices {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Sizes orders, computes their brackets and gates entries on realized losses.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    max_weekly_loss: Decimal,
    lot_step: Decimal,
    price_tick: Decimal,
    window: RiskWindow,
}

impl RiskGovernor {
    pub fn new(settings: &RiskSettings) -> Result<Self, RiskError> {
        if settings.max_weekly_loss <= Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "max_weekly_loss must be greater than 0".to_string(),
            ));
        }
        if settings.lot_step <= Decimal::ZERO || settings.price_tick <= Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "lot_step and price_tick must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            max_weekly_loss: settings.max_weekly_loss,
            lot_step: settings.lot_step,
            price_tick: settings.price_tick,
            window: RiskWindow::new(settings.reference_utc_offset_hours)?,
        })
    }

    pub fn window(&self) -> &RiskWindow {
        &self.window
    }

    /// `min(max_lot, (balance·sl%/100) / (price·sl%/100))`, rounded down to the lot step.
    ///
    /// Returns zero when balance, price or the stop distance is not positive.
    pub fn position_size(&self, balance: Decimal, price: Decimal, config: &StrategyConfig) -> Decimal {
        let sl_pct = config.stop_loss_pct;
        if balance <= Decimal::ZERO || price <= Decimal::ZERO || sl_pct <= Decimal::ZERO {
            tracing::debug!(%balance, %price, %sl_pct, "position size is zero");
            return Decimal::ZERO;
        }

        let risk_amount = balance * sl_pct / Decimal::ONE_HUNDRED;
        let stop_distance = price * sl_pct / Decimal::ONE_HUNDRED;
        let raw = (risk_amount / stop_distance).min(config.max_lot);
        let size = floor_to_step(raw, self.lot_step);

        tracing::debug!(%balance, %price, %raw, %size, max_lot = %config.max_lot, "position sized");
        size
    }

    /// Blocks when today's or this week's realized loss has reached its limit.
    /// Loss is `-min(pnl, 0)`, so a profitable window never blocks.
    pub fn check_trading_allowed(
        &self,
        config: &StrategyConfig,
        pnl_today: Decimal,
        pnl_week: Decimal,
    ) -> RiskDecision {
        let daily_loss = -pnl_today.min(Decimal::ZERO);
        if daily_loss >= config.max_daily_loss {
            return RiskDecision::Blocked(RiskLimitBreached {
                window: LimitWindow::Daily,
                loss: daily_loss,
                limit: config.max_daily_loss,
            });
        }

        let weekly_loss = -pnl_week.min(Decimal::ZERO);
        if weekly_loss >= self.max_weekly_loss {
            return RiskDecision::Blocked(RiskLimitBreached {
                window: LimitWindow::Weekly,
                loss: weekly_loss,
                limit: self.max_weekly_loss,
            });
        }

        RiskDecision::Allowed
    }

    /// Stop and target at `sl%` / `tp%` from entry, on the losing and winning
    /// side respectively, rounded to the price tick.
    pub fn exit_prices(&self, entry: Decimal, side: OrderSide, sl_pct: Decimal, tp_pct: Decimal) -> ExitPrices {
        let sl = sl_pct / Decimal::ONE_HUNDRED;
        let tp = tp_pct / Decimal::ONE_HUNDRED;
        let (stop, target) = match side {
            OrderSide::Buy => (entry * (Decimal::ONE - sl), entry * (Decimal::ONE + tp)),
            OrderSide::Sell => (entry * (Decimal::ONE + sl), entry * (Decimal::ONE - tp)),
        };
        ExitPrices {
            stop_loss: round_to_step(stop, self.price_tick),
            take_profit: round_to_step(target, self.price_tick),
        }
    }
}

fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    ((value / step).floor() * step).normalize()
}

fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    ((value / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step).normalize()
}

use chrono::{DateTime, Utc};
use core_types::{CloseReason, OrderSide};
use risk::RiskLimitBreached;
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// A position the engine closed, by signal or by bracket.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position_id: Uuid,
    pub strategy_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub reason: CloseReason,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
}

/// What one iteration did for one strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Opened {
        position_id: Uuid,
        side: OrderSide,
        quantity: Decimal,
        entry_price: Decimal,
    },
    Closed(ClosedPosition),
    /// An open position was evaluated and kept.
    Holding,
    NoSignal,
    RiskBlocked(RiskLimitBreached),
    /// Not evaluated: bad configuration, wrong symbol or a zero size.
    Skipped(String),
    Failed(String),
}

impl fmt::Display for StrategyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyOutcome::Opened {
                side,
                quantity,
                entry_price,
                ..
            } => write!(f, "opened {side} {quantity} @ {entry_price}"),
            StrategyOutcome::Closed(closed) => {
                write!(f, "closed ({}) pnl {}", closed.reason, closed.realized_pnl)
            }
            StrategyOutcome::Holding => f.write_str("holding"),
            StrategyOutcome::NoSignal => f.write_str("no signal"),
            StrategyOutcome::RiskBlocked(breach) => write!(f, "blocked: {breach}"),
            StrategyOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            StrategyOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReport {
    pub strategy_id: i64,
    pub name: String,
    pub outcome: StrategyOutcome,
}

/// Result of one supervisor pass over the open positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub closed: Vec<ClosedPosition>,
    /// Positions that could not be checked or closed this pass.
    pub failures: usize,
}

/// Everything one engine iteration did.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub started_at: DateTime<Utc>,
    pub strategies: Vec<StrategyReport>,
    pub sweep: SweepReport,
}

impl IterationReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            strategies: Vec::new(),
            sweep: SweepReport::default(),
        }
    }

    pub fn outcome_for(&self, strategy_id: i64) -> Option<&StrategyOutcome> {
        self.strategies
            .iter()
            .find(|s| s.strategy_id == strategy_id)
            .map(|s| &s.outcome)
    }

    pub fn opened(&self) -> usize {
        self.strategies
            .iter()
            .filter(|s| matches!(s.outcome, StrategyOutcome::Opened { .. }))
            .count()
    }
}

use crate::enums::{CloseReason, OrderSide};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to open a position.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub strategy_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub entry_time: DateTime<Utc>,
}

/// How a position was closed. Present only once the position is CLOSED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionExit {
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub realized_pnl: Decimal,
    pub reason: CloseReason,
}

/// A single exposure opened by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub strategy_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit: Option<PositionExit>,
}

impl Position {
    /// Opens a position after checking the bracket invariants:
    /// BUY needs `stop < entry < target`, SELL needs `stop > entry > target`.
    pub fn open(new: NewPosition) -> Result<Self, CoreError> {
        if new.entry_price <= Decimal::ZERO {
            return Err(CoreError::InvalidPosition(format!(
                "entry price must be positive, got {}",
                new.entry_price
            )));
        }
        if new.quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidPosition(format!(
                "quantity must be positive, got {}",
                new.quantity
            )));
        }
        let bracket_ok = match new.side {
            OrderSide::Buy => new.stop_loss < new.entry_price && new.entry_price < new.take_profit,
            OrderSide::Sell => new.stop_loss > new.entry_price && new.entry_price > new.take_profit,
        };
        if !bracket_ok {
            return Err(CoreError::InvalidPosition(format!(
                "{} bracket out of order: stop {} / entry {} / target {}",
                new.side, new.stop_loss, new.entry_price, new.take_profit
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            strategy_id: new.strategy_id,
            symbol: new.symbol,
            side: new.side,
            entry_price: new.entry_price,
            quantity: new.quantity,
            stop_loss: new.stop_loss,
            take_profit: new.take_profit,
            entry_time: new.entry_time,
            exit: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.exit.is_none()
    }

    /// Profit or loss if the position were closed at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        let gross = (price - self.entry_price) * self.quantity;
        match self.side {
            OrderSide::Buy => gross,
            OrderSide::Sell => -gross,
        }
    }

    /// Which bracket level, if any, `price` has crossed. The stop wins when both do.
    pub fn crossed_level(&self, price: Decimal) -> Option<CloseReason> {
        let (stop_hit, target_hit) = match self.side {
            OrderSide::Buy => (price <= self.stop_loss, price >= self.take_profit),
            OrderSide::Sell => (price >= self.stop_loss, price <= self.take_profit),
        };
        if stop_hit {
            Some(CloseReason::Stop)
        } else if target_hit {
            Some(CloseReason::Target)
        } else {
            None
        }
    }

    /// Moves the position to CLOSED. Exit price, time and realized PnL are set together.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<&PositionExit, CoreError> {
        if self.exit.is_some() {
            return Err(CoreError::AlreadyClosed(self.id));
        }
        let realized_pnl = self.pnl_at(exit_price);
        Ok(self.exit.insert(PositionExit {
            exit_price,
            exit_time,
            realized_pnl,
            reason,
        }))
    }
}

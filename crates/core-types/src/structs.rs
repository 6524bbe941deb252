use crate::enums::{OrderSide, OrderStatus, OrderType};
use crate::error::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single OHLCV bar of market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A bar exactly as the broker reported it. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: Option<DateTime<Utc>>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl RawBar {
    /// Names of the required fields this record is missing, in column order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.timestamp.is_none() {
            missing.push("timestamp");
        }
        if self.open.is_none() {
            missing.push("open");
        }
        if self.high.is_none() {
            missing.push("high");
        }
        if self.low.is_none() {
            missing.push("low");
        }
        if self.close.is_none() {
            missing.push("close");
        }
        if self.volume.is_none() {
            missing.push("volume");
        }
        missing
    }
}

impl From<PriceBar> for RawBar {
    fn from(bar: PriceBar) -> Self {
        Self {
            timestamp: Some(bar.timestamp),
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }
}

impl TryFrom<RawBar> for PriceBar {
    type Error = CoreError;

    fn try_from(raw: RawBar) -> Result<Self, Self::Error> {
        match (raw.timestamp, raw.open, raw.high, raw.low, raw.close, raw.volume) {
            (Some(timestamp), Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                Ok(PriceBar { timestamp, open, high, low, close, volume })
            }
            _ => Err(CoreError::InvalidInput(
                "price bar".to_string(),
                format!("missing required fields: {}", raw.missing_fields().join(", ")),
            )),
        }
    }
}

/// A bracket order request handed to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// The broker's acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub broker_order_id: String,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Average fill price, when the broker reports one.
    pub fill_price: Option<Decimal>,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// One row of the order log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub strategy_id: i64,
    pub position_id: Option<Uuid>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub broker_order_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Realized results of one strategy on one calendar day of the reference timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRiskState {
    pub strategy_id: i64,
    pub date: NaiveDate,
    pub realized_pnl: Decimal,
    pub trades_closed: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
}

impl DailyRiskState {
    pub fn empty(strategy_id: i64, date: NaiveDate) -> Self {
        Self {
            strategy_id,
            date,
            realized_pnl: Decimal::ZERO,
            trades_closed: 0,
            winning_trades: 0,
            losing_trades: 0,
        }
    }

    /// Folds one closed trade into the day's aggregate.
    pub fn record(&mut self, pnl: Decimal) {
        self.realized_pnl += pnl;
        self.trades_closed += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
    }

    pub fn win_rate_pct(&self) -> Decimal {
        if self.trades_closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.winning_trades) * Decimal::ONE_HUNDRED / Decimal::from(self.trades_closed)
    }
}

use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{DailyRiskState, NewStrategy, Position, StrategyConfig, StrategyRecord, StrategyUpdate, TradeRecord};
use rust_decimal::Decimal;

/// A persisted pre-trade block.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecisionRecord {
    pub strategy_id: i64,
    /// `DAILY` or `WEEKLY`.
    pub window: String,
    pub loss: Decimal,
    pub limit: Decimal,
    pub decided_at: DateTime<Utc>,
}

/// A row that exists in storage but could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// Primary key of the row, as text.
    pub id: String,
    pub strategy_id: i64,
    /// Strategy name or position symbol, for reports.
    pub label: String,
    pub reason: String,
}

/// Rows decoded one at a time: the good ones, and the ones that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub rejected: Vec<RejectedRow>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    pub fn push(&mut self, decoded: Result<T, RejectedRow>) {
        match decoded {
            Ok(row) => self.rows.push(row),
            Err(rejected) => self.rejected.push(rejected),
        }
    }
}

/// The record store the engine reads strategies from and writes positions,
/// trades and risk aggregates to.
///
/// Multi-row writes (`open_position`, `close_position`) are atomic.
#[async_trait]
pub trait Store: Send + Sync {
    /// Active strategy rows, unvalidated. Rows are decoded one by one so one
    /// bad row does not hide the rest.
    async fn load_active_strategies(&self) -> Result<Loaded<StrategyRecord>, DbError>;

    async fn list_strategies(&self) -> Result<Loaded<StrategyRecord>, DbError>;

    async fn get_strategy(&self, id: i64) -> Result<Option<StrategyRecord>, DbError>;

    /// Validates and inserts a strategy, returning it with its assigned id.
    async fn insert_strategy(&self, strategy: &NewStrategy) -> Result<StrategyConfig, DbError>;

    /// Applies `update` to the stored strategy. The merged result is validated
    /// before anything is written.
    async fn update_strategy(&self, id: i64, update: &StrategyUpdate) -> Result<StrategyConfig, DbError>;

    /// Clears the active flag. Positions and history are kept.
    async fn deactivate_strategy(&self, id: i64) -> Result<(), DbError>;

    async fn load_open_positions(&self) -> Result<Loaded<Position>, DbError>;

    async fn find_open_position(&self, strategy_id: i64, symbol: &str) -> Result<Option<Position>, DbError>;

    /// Inserts an open position together with its entry trade.
    async fn open_position(&self, position: &Position, entry_trade: &TradeRecord) -> Result<(), DbError>;

    /// Persists a closed position, marks its entry trade CLOSED and folds the
    /// realized PnL into the `trading_day` aggregate.
    ///
    /// Returns `false` without writing anything when the stored row is no
    /// longer open.
    async fn close_position(&self, position: &Position, trading_day: NaiveDate) -> Result<bool, DbError>;

    async fn append_trade(&self, trade: &TradeRecord) -> Result<(), DbError>;

    async fn trades_for_strategy(&self, strategy_id: i64) -> Result<Vec<TradeRecord>, DbError>;

    /// Realized PnL over the inclusive date range, for one strategy or, with
    /// `None`, for the whole account.
    async fn realized_pnl_between(
        &self,
        strategy_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, DbError>;

    async fn daily_risk_state(&self, strategy_id: i64, date: NaiveDate) -> Result<DailyRiskState, DbError>;

    async fn record_decision(&self, decision: &RiskDecisionRecord) -> Result<(), DbError>;
}

use crate::DbError;
use crate::store::{Loaded, RejectedRow, RiskDecisionRecord, Store};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{
    CloseReason, CoreError, DailyRiskState, NewStrategy, OrderSide, OrderStatus, OrderType, Position, PositionExit,
    StrategyConfig, StrategyRecord, StrategyUpdate, TradeRecord,
};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: SqlitePool,
}

// Raw rows. Decimals and ids come back as TEXT and are parsed on conversion.

#[derive(Debug, FromRow)]
struct StrategyRow {
    id: i64,
    name: String,
    symbol: String,
    timeframe: String,
    granularity: String,
    fast_ema: Option<i64>,
    slow_ema: Option<i64>,
    rsi_period: Option<i64>,
    rsi_overbought: Option<f64>,
    rsi_oversold: Option<f64>,
    position_size: String,
    stop_loss_percent: String,
    take_profit_percent: String,
    max_daily_loss: String,
    is_active: bool,
}

impl TryFrom<StrategyRow> for StrategyRecord {
    type Error = DbError;

    fn try_from(row: StrategyRow) -> Result<Self, Self::Error> {
        Ok(StrategyRecord {
            id: row.id,
            position_size: decimal("position_size", &row.position_size)?,
            stop_loss_percent: decimal("stop_loss_percent", &row.stop_loss_percent)?,
            take_profit_percent: decimal("take_profit_percent", &row.take_profit_percent)?,
            max_daily_loss: decimal("max_daily_loss", &row.max_daily_loss)?,
            name: row.name,
            symbol: row.symbol,
            timeframe: row.timeframe,
            granularity: row.granularity,
            fast_ema: row.fast_ema,
            slow_ema: row.slow_ema,
            rsi_period: row.rsi_period,
            rsi_overbought: row.rsi_overbought,
            rsi_oversold: row.rsi_oversold,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct PositionRow {
    id: String,
    strategy_id: i64,
    symbol: String,
    side: String,
    entry_price: String,
    quantity: String,
    stop_loss: String,
    take_profit: String,
    entry_time: DateTime<Utc>,
    exit_price: Option<String>,
    exit_time: Option<DateTime<Utc>>,
    realized_pnl: Option<String>,
    close_reason: Option<String>,
}

impl TryFrom<PositionRow> for Position {
    type Error = DbError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let exit = match (row.exit_price, row.exit_time, row.realized_pnl, row.close_reason) {
            (None, None, None, None) => None,
            (Some(price), Some(time), Some(pnl), Some(reason)) => Some(PositionExit {
                exit_price: decimal("exit_price", &price)?,
                exit_time: time,
                realized_pnl: decimal("realized_pnl", &pnl)?,
                reason: parse::<CloseReason>("close_reason", &reason)?,
            }),
            _ => {
                return Err(DbError::InvalidRow(format!("position {} has a partial exit", row.id)));
            }
        };
        Ok(Position {
            id: uuid("positions.id", &row.id)?,
            strategy_id: row.strategy_id,
            symbol: row.symbol,
            side: parse::<OrderSide>("side", &row.side)?,
            entry_price: decimal("entry_price", &row.entry_price)?,
            quantity: decimal("quantity", &row.quantity)?,
            stop_loss: decimal("stop_loss", &row.stop_loss)?,
            take_profit: decimal("take_profit", &row.take_profit)?,
            entry_time: row.entry_time,
            exit,
        })
    }
}

#[derive(Debug, FromRow)]
struct TradeRow {
    id: String,
    strategy_id: i64,
    position_id: Option<String>,
    symbol: String,
    side: String,
    order_type: String,
    status: String,
    price: String,
    quantity: String,
    stop_loss: Option<String>,
    take_profit: Option<String>,
    broker_order_id: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = DbError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        Ok(TradeRecord {
            trade_id: uuid("trades.id", &row.id)?,
            strategy_id: row.strategy_id,
            position_id: row.position_id.as_deref().map(|id| uuid("trades.position_id", id)).transpose()?,
            symbol: row.symbol,
            side: parse::<OrderSide>("side", &row.side)?,
            order_type: parse::<OrderType>("order_type", &row.order_type)?,
            status: parse::<OrderStatus>("status", &row.status)?,
            price: decimal("price", &row.price)?,
            quantity: decimal("quantity", &row.quantity)?,
            stop_loss: row.stop_loss.as_deref().map(|v| decimal("stop_loss", v)).transpose()?,
            take_profit: row.take_profit.as_deref().map(|v| decimal("take_profit", v)).transpose()?,
            broker_order_id: row.broker_order_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DailyRiskRow {
    realized_pnl: String,
    trades_closed: i64,
    winning_trades: i64,
    losing_trades: i64,
}

fn decimal(column: &str, text: &str) -> Result<Decimal, DbError> {
    Decimal::from_str(text).map_err(|e| DbError::InvalidRow(format!("{column} = {text:?}: {e}")))
}

fn uuid(column: &str, text: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(text).map_err(|e| DbError::InvalidRow(format!("{column} = {text:?}: {e}")))
}

fn parse<T: FromStr<Err = CoreError>>(column: &str, text: &str) -> Result<T, DbError> {
    text.parse::<T>().map_err(|e| DbError::InvalidRow(format!("{column}: {e}")))
}

fn period(value: usize) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::InvalidRow(format!("period {value} does not fit a column")))
}

fn conflict_or(err: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
    if err.as_database_error().is_some_and(|db| db.is_unique_violation()) {
        DbError::Conflict(what())
    } else {
        DbError::QueryError(err)
    }
}

const POSITION_COLUMNS: &str = "id, strategy_id, symbol, side, entry_price, quantity, stop_loss, take_profit, \
     entry_time, exit_price, exit_time, realized_pnl, close_reason";

const STRATEGY_COLUMNS: &str = "id, name, symbol, timeframe, granularity, fast_ema, slow_ema, rsi_period, \
     rsi_overbought, rsi_oversold, position_size, stop_loss_percent, take_profit_percent, max_daily_loss, is_active";

async fn insert_position(conn: &mut SqliteConnection, position: &Position) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO positions (
            id, strategy_id, symbol, side, entry_price, quantity, stop_loss, take_profit, entry_time, status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'OPEN')
        "#,
    )
    .bind(position.id.to_string())
    .bind(position.strategy_id)
    .bind(&position.symbol)
    .bind(position.side.as_str())
    .bind(position.entry_price.to_string())
    .bind(position.quantity.to_string())
    .bind(position.stop_loss.to_string())
    .bind(position.take_profit.to_string())
    .bind(position.entry_time)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        conflict_or(e, || {
            format!("strategy {} already has an open {} position", position.strategy_id, position.symbol)
        })
    })?;
    Ok(())
}

async fn insert_trade(conn: &mut SqliteConnection, trade: &TradeRecord) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO trades (
            id, strategy_id, position_id, symbol, side, order_type, status, price, quantity,
            stop_loss, take_profit, broker_order_id, note, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(trade.trade_id.to_string())
    .bind(trade.strategy_id)
    .bind(trade.position_id.map(|id| id.to_string()))
    .bind(&trade.symbol)
    .bind(trade.side.as_str())
    .bind(trade.order_type.as_str())
    .bind(trade.status.as_str())
    .bind(trade.price.to_string())
    .bind(trade.quantity.to_string())
    .bind(trade.stop_loss.map(|v| v.to_string()))
    .bind(trade.take_profit.map(|v| v.to_string()))
    .bind(&trade.broker_order_id)
    .bind(&trade.note)
    .bind(trade.created_at)
    .bind(trade.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_strategy(conn: &mut SqliteConnection, id: i64) -> Result<Option<StrategyRecord>, DbError> {
    let row = sqlx::query_as::<_, StrategyRow>(&format!("SELECT {STRATEGY_COLUMNS} FROM strategies WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(StrategyRecord::try_from).transpose()
}

async fn fetch_daily(
    conn: &mut SqliteConnection,
    strategy_id: i64,
    date: NaiveDate,
) -> Result<DailyRiskState, DbError> {
    let row = sqlx::query_as::<_, DailyRiskRow>(
        "SELECT realized_pnl, trades_closed, winning_trades, losing_trades FROM daily_risk WHERE strategy_id = ? AND date = ?",
    )
    .bind(strategy_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match row {
        Some(row) => DailyRiskState {
            strategy_id,
            date,
            realized_pnl: decimal("realized_pnl", &row.realized_pnl)?,
            trades_closed: row.trades_closed,
            winning_trades: row.winning_trades,
            losing_trades: row.losing_trades,
        },
        None => DailyRiskState::empty(strategy_id, date),
    })
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs `operation` inside one transaction: commit on `Ok`, roll back on
    /// `Err`. The connection goes back to the pool on every path.
    ///
    /// The closure receives the transaction's connection and must own
    /// everything else it uses.
    pub async fn in_transaction<T, F>(&self, operation: F) -> Result<T, DbError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    {
        let mut tx = self.pool.begin().await?;
        match operation(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn decode_strategies(rows: Vec<StrategyRow>) -> Loaded<StrategyRecord> {
    let mut loaded = Loaded::default();
    for row in rows {
        let (id, name) = (row.id, row.name.clone());
        loaded.push(StrategyRecord::try_from(row).map_err(|e| {
            tracing::error!(strategy_id = id, error = %e, "unreadable strategy row");
            RejectedRow {
                id: id.to_string(),
                strategy_id: id,
                label: name,
                reason: e.to_string(),
            }
        }));
    }
    loaded
}

#[async_trait]
impl Store for DbRepository {
    async fn load_active_strategies(&self) -> Result<Loaded<StrategyRecord>, DbError> {
        let rows = sqlx::query_as::<_, StrategyRow>(&format!(
            "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_strategies(rows))
    }

    async fn list_strategies(&self) -> Result<Loaded<StrategyRecord>, DbError> {
        let rows = sqlx::query_as::<_, StrategyRow>(&format!("SELECT {STRATEGY_COLUMNS} FROM strategies ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(decode_strategies(rows))
    }

    async fn get_strategy(&self, id: i64) -> Result<Option<StrategyRecord>, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch_strategy(&mut conn, id).await
    }

    async fn insert_strategy(&self, strategy: &NewStrategy) -> Result<StrategyConfig, DbError> {
        // Validate before touching the table; the id is assigned by the insert.
        let draft = strategy.clone().into_config(0)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO strategies (
                name, symbol, timeframe, granularity, fast_ema, slow_ema, rsi_period,
                rsi_overbought, rsi_oversold, position_size, stop_loss_percent,
                take_profit_percent, max_daily_loss, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.symbol)
        .bind(&draft.timeframe)
        .bind(draft.granularity.as_str())
        .bind(period(draft.fast_ema)?)
        .bind(period(draft.slow_ema)?)
        .bind(period(draft.rsi_period)?)
        .bind(draft.rsi_overbought)
        .bind(draft.rsi_oversold)
        .bind(draft.max_lot.to_string())
        .bind(draft.stop_loss_pct.to_string())
        .bind(draft.take_profit_pct.to_string())
        .bind(draft.max_daily_loss.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let config = StrategyConfig {
            id: result.last_insert_rowid(),
            ..draft
        };
        tracing::info!(strategy_id = config.id, name = %config.name, "strategy inserted");
        Ok(config)
    }

    async fn update_strategy(&self, id: i64, update: &StrategyUpdate) -> Result<StrategyConfig, DbError> {
        let update = update.clone();
        let config = self
            .in_transaction(move |conn| {
                Box::pin(async move {
                    let record = fetch_strategy(conn, id).await?.ok_or(DbError::NotFound)?;
                    let next = update.apply(&StrategyConfig::try_from(record)?)?;

                    sqlx::query(
                        r#"
                        UPDATE strategies SET
                            name = ?, timeframe = ?, granularity = ?, fast_ema = ?, slow_ema = ?,
                            rsi_period = ?, rsi_overbought = ?, rsi_oversold = ?, position_size = ?,
                            stop_loss_percent = ?, take_profit_percent = ?, max_daily_loss = ?,
                            is_active = ?, updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&next.name)
                    .bind(&next.timeframe)
                    .bind(next.granularity.as_str())
                    .bind(period(next.fast_ema)?)
                    .bind(period(next.slow_ema)?)
                    .bind(period(next.rsi_period)?)
                    .bind(next.rsi_overbought)
                    .bind(next.rsi_oversold)
                    .bind(next.max_lot.to_string())
                    .bind(next.stop_loss_pct.to_string())
                    .bind(next.take_profit_pct.to_string())
                    .bind(next.max_daily_loss.to_string())
                    .bind(next.active)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
                    Ok(next)
                })
            })
            .await?;
        tracing::info!(strategy_id = id, "strategy updated");
        Ok(config)
    }

    async fn deactivate_strategy(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE strategies SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        tracing::info!(strategy_id = id, "strategy deactivated");
        Ok(())
    }

    async fn load_open_positions(&self) -> Result<Loaded<Position>, DbError> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE status = 'OPEN' ORDER BY entry_time"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut loaded = Loaded::default();
        for row in rows {
            let (id, strategy_id, symbol) = (row.id.clone(), row.strategy_id, row.symbol.clone());
            loaded.push(Position::try_from(row).map_err(|e| {
                tracing::error!(position_id = %id, strategy_id, error = %e, "unreadable position row");
                RejectedRow {
                    id,
                    strategy_id,
                    label: symbol,
                    reason: e.to_string(),
                }
            }));
        }
        Ok(loaded)
    }

    async fn find_open_position(&self, strategy_id: i64, symbol: &str) -> Result<Option<Position>, DbError> {
        let row = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE strategy_id = ? AND symbol = ? AND status = 'OPEN'"
        ))
        .bind(strategy_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Position::try_from).transpose()
    }

    async fn open_position(&self, position: &Position, entry_trade: &TradeRecord) -> Result<(), DbError> {
        if !position.is_open() {
            return Err(CoreError::InvalidPosition(format!("position {} is already closed", position.id)).into());
        }
        let position = position.clone();
        let trade = entry_trade.clone();
        self.in_transaction(move |conn| {
            Box::pin(async move {
                insert_position(conn, &position).await?;
                insert_trade(conn, &trade).await
            })
        })
        .await
    }

    async fn close_position(&self, position: &Position, trading_day: NaiveDate) -> Result<bool, DbError> {
        let exit = position
            .exit
            .clone()
            .ok_or_else(|| CoreError::InvalidPosition(format!("position {} has no exit to persist", position.id)))?;
        let id = position.id.to_string();
        let strategy_id = position.strategy_id;

        self.in_transaction(move |conn| {
            Box::pin(async move {
                let updated = sqlx::query(
                    r#"
                    UPDATE positions
                    SET status = 'CLOSED', exit_price = ?, exit_time = ?, realized_pnl = ?, close_reason = ?
                    WHERE id = ? AND status = 'OPEN'
                    "#,
                )
                .bind(exit.exit_price.to_string())
                .bind(exit.exit_time)
                .bind(exit.realized_pnl.to_string())
                .bind(exit.reason.as_str())
                .bind(&id)
                .execute(&mut *conn)
                .await?;
                if updated.rows_affected() == 0 {
                    return Ok(false);
                }

                sqlx::query(
                    "UPDATE trades SET status = 'CLOSED', updated_at = ? WHERE position_id = ? AND status = 'EXECUTED'",
                )
                .bind(exit.exit_time)
                .bind(&id)
                .execute(&mut *conn)
                .await?;

                let mut day = fetch_daily(conn, strategy_id, trading_day).await?;
                day.record(exit.realized_pnl);
                sqlx::query(
                    r#"
                    INSERT INTO daily_risk (strategy_id, date, realized_pnl, trades_closed, winning_trades, losing_trades)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT (strategy_id, date) DO UPDATE SET
                        realized_pnl = excluded.realized_pnl,
                        trades_closed = excluded.trades_closed,
                        winning_trades = excluded.winning_trades,
                        losing_trades = excluded.losing_trades
                    "#,
                )
                .bind(day.strategy_id)
                .bind(day.date)
                .bind(day.realized_pnl.to_string())
                .bind(day.trades_closed)
                .bind(day.winning_trades)
                .bind(day.losing_trades)
                .execute(&mut *conn)
                .await?;
                Ok(true)
            })
        })
        .await
    }

    async fn append_trade(&self, trade: &TradeRecord) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        insert_trade(&mut conn, trade).await
    }

    async fn trades_for_strategy(&self, strategy_id: i64) -> Result<Vec<TradeRecord>, DbError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT id, strategy_id, position_id, symbol, side, order_type, status, price, quantity,
                   stop_loss, take_profit, broker_order_id, note, created_at
            FROM trades WHERE strategy_id = ? ORDER BY created_at, rowid
            "#,
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TradeRecord::try_from).collect()
    }

    async fn realized_pnl_between(
        &self,
        strategy_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, DbError> {
        let amounts: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT realized_pnl FROM daily_risk
            WHERE date >= ? AND date <= ? AND (? IS NULL OR strategy_id = ?)
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(strategy_id)
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        amounts
            .iter()
            .try_fold(Decimal::ZERO, |sum, text| Ok(sum + decimal("realized_pnl", text)?))
    }

    async fn daily_risk_state(&self, strategy_id: i64, date: NaiveDate) -> Result<DailyRiskState, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch_daily(&mut conn, strategy_id, date).await
    }

    async fn record_decision(&self, decision: &RiskDecisionRecord) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO risk_decisions (strategy_id, limit_window, loss, loss_limit, decided_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(decision.strategy_id)
        .bind(&decision.window)
        .bind(decision.loss.to_string())
        .bind(decision.limit.to_string())
        .bind(decision.decided_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

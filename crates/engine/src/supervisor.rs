use crate::error::EngineError;
use crate::report::{ClosedPosition, SweepReport};
use api_client::Broker;
use chrono::{DateTime, Utc};
use core_types::{CloseReason, Position};
use database::Store;
use risk::RiskWindow;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Drives open positions to CLOSED when their bracket is crossed, and performs
/// every close the engine makes.
pub struct PositionSupervisor {
    broker: Arc<dyn Broker>,
    store: Arc<dyn Store>,
    window: RiskWindow,
}

impl PositionSupervisor {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn Store>, window: RiskWindow) -> Self {
        Self { broker, store, window }
    }

    /// One pass over every open position.
    ///
    /// The price of each symbol is fetched once. A failure on one position is
    /// logged and counted; the rest of the sweep carries on. Unreadable rows
    /// count as failures. Only failing to query the positions at all is an error.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let positions = self.store.load_open_positions().await?;
        let mut prices: HashMap<String, Option<Decimal>> = HashMap::new();
        let mut report = SweepReport {
            failures: positions.rejected.len(),
            ..Default::default()
        };

        for position in positions.rows {
            let price = match prices.get(&position.symbol) {
                Some(cached) => *cached,
                None => {
                    let fetched = match self.broker.get_current_price(&position.symbol).await {
                        Ok(price) => Some(price),
                        Err(e) => {
                            tracing::warn!(symbol = %position.symbol, error = %e, "price unavailable, positions not checked");
                            None
                        }
                    };
                    prices.insert(position.symbol.clone(), fetched);
                    fetched
                }
            };
            let Some(price) = price else {
                report.failures += 1;
                continue;
            };

            let Some(reason) = position.crossed_level(price) else {
                continue;
            };

            let position_id = position.id;
            match self.close(position, price, reason, now).await {
                Ok(Some(closed)) => report.closed.push(closed),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(%position_id, error = %e, "failed to close position; it stays open");
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }

    /// Flattens the position at the broker, then records the close.
    ///
    /// A broker failure leaves the position open. Returns `None` when the
    /// store no longer had the position open.
    pub async fn close(
        &self,
        mut position: Position,
        price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosedPosition>, EngineError> {
        if !self.broker.close_position(&position.symbol).await? {
            tracing::warn!(position_id = %position.id, symbol = %position.symbol, "broker reported no exposure to close");
        }

        let exit = position.close(price, now, reason)?.clone();
        if !self.store.close_position(&position, self.window.today(now)).await? {
            tracing::info!(position_id = %position.id, "position was already closed");
            return Ok(None);
        }

        tracing::info!(
            target: "trades",
            position_id = %position.id,
            strategy_id = position.strategy_id,
            symbol = %position.symbol,
            side = %position.side,
            reason = %exit.reason,
            entry_price = %position.entry_price,
            exit_price = %exit.exit_price,
            realized_pnl = %exit.realized_pnl,
            "position closed"
        );

        Ok(Some(ClosedPosition {
            position_id: position.id,
            strategy_id: position.strategy_id,
            symbol: position.symbol,
            side: position.side,
            reason: exit.reason,
            exit_price: exit.exit_price,
            realized_pnl: exit.realized_pnl,
        }))
    }
}

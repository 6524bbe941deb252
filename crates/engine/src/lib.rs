//! # Bullion Engine
//!
//! The control loop that ties the workspace together. Each iteration loads the
//! active strategies, evaluates them against fresh market data, gates and
//! places entries, closes positions on exit signals and finally sweeps every
//! open position against its bracket.
//!
//! ## Public API
//!
//! - `TradingEngine`: start/stop the loop, run one iteration, manage strategies.
//! - `PositionSupervisor`: the bracket sweep and the single close path.
//! - `StateReconciler`: startup audit of store vs broker exposure.

use api_client::Broker;
use chrono::{DateTime, Utc};
use configuration::{Config, EngineSettings, SignalSettings};
use core_types::{
    NewPosition, NewStrategy, OrderRequest, OrderStatus, OrderType, Position, StrategyConfig, StrategyRecord,
    StrategyUpdate, TradeRecord,
};
use database::{DbError, Loaded, RiskDecisionRecord, Store};
use indicators::PriceSeries;
use risk::{RiskDecision, RiskGovernor};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strategies::create_strategy;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub mod error;
pub mod reconciler;
pub mod report;
pub mod supervisor;

pub use error::EngineError;
pub use reconciler::{QuantityMismatch, ReconciliationReport, StateReconciler};
pub use report::{ClosedPosition, IterationReport, StrategyOutcome, StrategyReport, SweepReport};
pub use supervisor::PositionSupervisor;

/// Everything an iteration needs, shared with the loop task.
struct EngineCore {
    settings: EngineSettings,
    signals: SignalSettings,
    broker: Arc<dyn Broker>,
    store: Arc<dyn Store>,
    governor: RiskGovernor,
    supervisor: PositionSupervisor,
    reconciler: StateReconciler,
    /// Held for the whole of an iteration so iterations never overlap.
    iteration: Mutex<()>,
}

struct LoopTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The central orchestrator for live trading.
pub struct TradingEngine {
    core: Arc<EngineCore>,
    running: AtomicBool,
    task: Mutex<Option<LoopTask>>,
}

impl TradingEngine {
    pub fn new(config: &Config, broker: Arc<dyn Broker>, store: Arc<dyn Store>) -> Result<Self, EngineError> {
        let governor = RiskGovernor::new(&config.risk)?;
        let window = *governor.window();
        Ok(Self {
            core: Arc::new(EngineCore {
                settings: config.engine.clone(),
                signals: config.signals.clone(),
                supervisor: PositionSupervisor::new(Arc::clone(&broker), Arc::clone(&store), window),
                reconciler: StateReconciler::new(Arc::clone(&broker), Arc::clone(&store)),
                broker,
                store,
                governor,
                iteration: Mutex::new(()),
            }),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Starts the loop on its own task. Calling it while running is a no-op.
    ///
    /// Open positions are reconciled against the broker first; a failed
    /// reconciliation is logged and does not block the start.
    pub async fn start(&self) -> Result<(), EngineError> {
        // Held until the task is stored so a concurrent `stop` waits for it.
        let mut task = self.task.lock().await;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("engine already running");
            return Ok(());
        }

        if let Err(e) = self.core.reconciler.run_reconciliation().await {
            tracing::error!(error = %e, "startup reconciliation failed");
        }

        let (shutdown, receiver) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.core), receiver));
        *task = Some(LoopTask { shutdown, handle });
        tracing::info!(
            interval_secs = self.core.settings.interval_secs,
            symbol = %self.core.settings.symbol,
            "engine started"
        );
        Ok(())
    }

    /// Signals the loop to stop and waits for the current iteration to finish.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return Ok(());
        };

        // The receiver is only gone if the task already ended.
        let _ = task.shutdown.send(true);
        let joined = task.handle.await;
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("engine stopped");
        joined.map_err(|e| EngineError::Task(e.to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs one iteration now. Waits if the loop is mid-iteration.
    pub async fn run_iteration(&self) -> Result<IterationReport, EngineError> {
        self.core.run_iteration(Utc::now()).await
    }

    pub async fn add_strategy(&self, strategy: NewStrategy) -> Result<StrategyConfig, EngineError> {
        Ok(self.core.store.insert_strategy(&strategy).await?)
    }

    /// Deactivates a strategy. Its open position, if any, stays under supervision.
    pub async fn remove_strategy(&self, id: i64) -> Result<(), EngineError> {
        self.core.store.deactivate_strategy(id).await.map_err(|e| not_found(e, id))
    }

    pub async fn update_strategy(&self, id: i64, update: StrategyUpdate) -> Result<StrategyConfig, EngineError> {
        self.core
            .store
            .update_strategy(id, &update)
            .await
            .map_err(|e| not_found(e, id))
    }

    /// Every strategy, active or not, as stored. Rows that cannot be decoded
    /// are returned separately.
    pub async fn list_strategies(&self) -> Result<Loaded<StrategyRecord>, EngineError> {
        Ok(self.core.store.list_strategies().await?)
    }

    pub async fn get_active_positions(&self) -> Result<Loaded<Position>, EngineError> {
        Ok(self.core.store.load_open_positions().await?)
    }

    pub async fn reconcile(&self) -> Result<ReconciliationReport, EngineError> {
        self.core.reconciler.run_reconciliation().await
    }
}

fn not_found(err: DbError, id: i64) -> EngineError {
    match err {
        DbError::NotFound => EngineError::StrategyNotFound(id),
        other => other.into(),
    }
}

async fn run_loop(core: Arc<EngineCore>, mut shutdown: watch::Receiver<bool>) {
    let interval = Duration::from_secs(core.settings.interval_secs);
    let cooldown = Duration::from_secs(core.settings.cooldown_secs);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let pause = match core.run_iteration(Utc::now()).await {
            Ok(report) => {
                tracing::debug!(
                    strategies = report.strategies.len(),
                    opened = report.opened(),
                    closed = report.sweep.closed.len(),
                    sweep_failures = report.sweep.failures,
                    "iteration complete"
                );
                interval
            }
            Err(e) => {
                tracing::error!(error = %e, cooldown_secs = cooldown.as_secs(), "iteration failed, cooling down");
                cooldown
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

impl EngineCore {
    async fn run_iteration(&self, now: DateTime<Utc>) -> Result<IterationReport, EngineError> {
        let _guard = self.iteration.lock().await;
        let records = self.store.load_active_strategies().await?;
        let mut report = IterationReport::new(now);

        for row in records.rejected {
            report.strategies.push(StrategyReport {
                strategy_id: row.strategy_id,
                name: row.label,
                outcome: StrategyOutcome::Skipped(format!("unreadable strategy row: {}", row.reason)),
            });
        }

        for record in records.rows {
            let strategy_id = record.id;
            let name = record.name.clone();
            let outcome = match StrategyConfig::try_from(record) {
                Err(e) => {
                    tracing::error!(strategy_id, error = %e, "strategy configuration rejected");
                    StrategyOutcome::Skipped(e.to_string())
                }
                Ok(config) => match self.evaluate_strategy(&config, now).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(strategy_id, error = %e, "strategy evaluation failed");
                        StrategyOutcome::Failed(e.to_string())
                    }
                },
            };
            report.strategies.push(StrategyReport {
                strategy_id,
                name,
                outcome,
            });
        }

        report.sweep = self.supervisor.sweep(now).await?;
        Ok(report)
    }

    async fn evaluate_strategy(&self, config: &StrategyConfig, now: DateTime<Utc>) -> Result<StrategyOutcome, EngineError> {
        if config.symbol != self.settings.symbol {
            return Ok(StrategyOutcome::Skipped(format!(
                "engine trades {} only, strategy wants {}",
                self.settings.symbol, config.symbol
            )));
        }

        let strategy = create_strategy(config, &self.signals)?;
        let bars = self
            .broker
            .get_market_data(&config.symbol, &config.timeframe, self.settings.market_data_limit)
            .await?;
        let series = PriceSeries::from_raw(bars)?;

        if let Some(position) = self.store.find_open_position(config.id, &config.symbol).await? {
            let Some(reason) = strategy.evaluate_exit(&series, &position)? else {
                return Ok(StrategyOutcome::Holding);
            };
            let price = self.broker.get_current_price(&config.symbol).await?;
            return Ok(match self.supervisor.close(position, price, reason, now).await? {
                Some(closed) => StrategyOutcome::Closed(closed),
                None => StrategyOutcome::Holding,
            });
        }

        let decision = strategy.evaluate_entry(&series)?;
        decision.log(config.id, &config.symbol);
        let Some(side) = decision.side else {
            return Ok(StrategyOutcome::NoSignal);
        };

        let window = self.governor.window();
        let today = window.today(now);
        let pnl_today = self.store.daily_risk_state(config.id, today).await?.realized_pnl;
        let pnl_week = self.store.realized_pnl_between(Some(config.id), window.week_start(now), today).await?;
        if let RiskDecision::Blocked(breach) = self.governor.check_trading_allowed(config, pnl_today, pnl_week) {
            tracing::warn!(strategy_id = config.id, %breach, "entry blocked by risk limit");
            self.store
                .record_decision(&RiskDecisionRecord {
                    strategy_id: config.id,
                    window: breach.window.as_str().to_string(),
                    loss: breach.loss,
                    limit: breach.limit,
                    decided_at: now,
                })
                .await?;
            return Ok(StrategyOutcome::RiskBlocked(breach));
        }

        let price = self.broker.get_current_price(&config.symbol).await?;
        let balance = self.broker.get_account_balance().await?;
        let quantity = self.governor.position_size(balance, price, config);
        if quantity.is_zero() {
            return Ok(StrategyOutcome::Skipped(format!(
                "position size is zero (balance {balance}, price {price})"
            )));
        }

        let exits = self
            .governor
            .exit_prices(price, side, config.stop_loss_pct, config.take_profit_pct);
        let order = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: config.symbol.clone(),
            order_type: OrderType::Market,
            side,
            quantity,
            stop_loss: Some(exits.stop_loss),
            take_profit: Some(exits.take_profit),
        };
        let order_trade = |status: OrderStatus,
                           position_id: Option<Uuid>,
                           price: Decimal,
                           broker_order_id: Option<String>,
                           note: Option<String>| TradeRecord {
            trade_id: order.client_order_id,
            strategy_id: config.id,
            position_id,
            symbol: order.symbol.clone(),
            side,
            order_type: order.order_type,
            status,
            price,
            quantity: order.quantity,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            broker_order_id,
            note,
            created_at: now,
        };

        let ack = match self.broker.place_order(&order).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!(strategy_id = config.id, error = %e, "order placement failed");
                self.store
                    .append_trade(&order_trade(OrderStatus::Failed, None, price, None, Some(e.to_string())))
                    .await?;
                return Ok(StrategyOutcome::Failed(format!("order placement failed: {e}")));
            }
        };
        if matches!(ack.status, OrderStatus::Cancelled | OrderStatus::Failed) {
            self.store
                .append_trade(&order_trade(
                    ack.status,
                    None,
                    price,
                    Some(ack.broker_order_id.clone()),
                    None,
                ))
                .await?;
            return Ok(StrategyOutcome::Failed(format!(
                "order {} ended {}",
                ack.broker_order_id,
                ack.status.as_str()
            )));
        }

        // The fill can differ from the quote and the order; the bracket
        // follows the actual entry.
        let entry_price = ack.fill_price.unwrap_or(price);
        let filled = if ack.quantity > Decimal::ZERO { ack.quantity } else { order.quantity };
        let exits = self
            .governor
            .exit_prices(entry_price, side, config.stop_loss_pct, config.take_profit_pct);
        let opened = Position::open(NewPosition {
            strategy_id: config.id,
            symbol: config.symbol.clone(),
            side,
            entry_price,
            quantity: filled,
            stop_loss: exits.stop_loss,
            take_profit: exits.take_profit,
            entry_time: now,
        });
        let recorded = match opened {
            Ok(position) => {
                let trade = TradeRecord {
                    quantity: filled,
                    stop_loss: Some(exits.stop_loss),
                    take_profit: Some(exits.take_profit),
                    ..order_trade(
                        OrderStatus::Executed,
                        Some(position.id),
                        entry_price,
                        Some(ack.broker_order_id.clone()),
                        None,
                    )
                };
                match self.store.open_position(&position, &trade).await {
                    Ok(()) => Ok(position),
                    Err(e) => Err(EngineError::from(e)),
                }
            }
            Err(e) => Err(e.into()),
        };
        let position = match recorded {
            Ok(position) => position,
            Err(e) => {
                // The broker holds exposure the store does not; reconciliation
                // will report it as untracked.
                tracing::error!(
                    strategy_id = config.id,
                    broker_order_id = %ack.broker_order_id,
                    error = %e,
                    "order filled but the position was not recorded"
                );
                self.store
                    .append_trade(&TradeRecord {
                        quantity: filled,
                        ..order_trade(
                            ack.status,
                            None,
                            entry_price,
                            Some(ack.broker_order_id.clone()),
                            Some(format!("position not recorded: {e}")),
                        )
                    })
                    .await?;
                return Ok(StrategyOutcome::Failed(format!(
                    "order {} filled but the position was not recorded: {e}",
                    ack.broker_order_id
                )));
            }
        };

        tracing::info!(
            target: "trades",
            position_id = %position.id,
            strategy_id = config.id,
            symbol = %position.symbol,
            side = %side,
            quantity = %position.quantity,
            entry_price = %entry_price,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            broker_order_id = %ack.broker_order_id,
            "position opened"
        );
        Ok(StrategyOutcome::Opened {
            position_id: position.id,
            side,
            quantity: position.quantity,
            entry_price,
        })
    }
}

use crate::error::EngineError;
use api_client::{Broker, BrokerPosition};
use core_types::{OrderSide, Position};
use database::Store;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityMismatch {
    pub symbol: String,
    /// Net signed quantity: BUY positive, SELL negative.
    pub local: Decimal,
    pub broker: Decimal,
}

/// Differences between the store's open positions and the broker's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationReport {
    /// Open in the store, flat at the broker.
    pub ghosts: Vec<String>,
    /// Held at the broker, unknown to the store.
    pub untracked: Vec<String>,
    pub mismatched: Vec<QuantityMismatch>,
    /// Ids of open position rows the store could not decode.
    pub unreadable: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.ghosts.is_empty() && self.untracked.is_empty() && self.mismatched.is_empty() && self.unreadable.is_empty()
    }
}

fn signed(side: OrderSide, quantity: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => quantity,
        OrderSide::Sell => -quantity,
    }
}

/// Compares net exposure per symbol.
pub fn compare(local: &[Position], broker: &[BrokerPosition]) -> ReconciliationReport {
    let mut local_net: BTreeMap<&str, Decimal> = BTreeMap::new();
    for p in local {
        *local_net.entry(p.symbol.as_str()).or_default() += signed(p.side, p.quantity);
    }
    let mut broker_net: BTreeMap<&str, Decimal> = BTreeMap::new();
    for p in broker {
        *broker_net.entry(p.symbol.as_str()).or_default() += signed(p.side, p.quantity);
    }
    local_net.retain(|_, q| !q.is_zero());
    broker_net.retain(|_, q| !q.is_zero());

    let mut report = ReconciliationReport::default();
    for (symbol, &local_qty) in &local_net {
        match broker_net.get(symbol) {
            None => report.ghosts.push(symbol.to_string()),
            Some(&broker_qty) if broker_qty != local_qty => report.mismatched.push(QuantityMismatch {
                symbol: symbol.to_string(),
                local: local_qty,
                broker: broker_qty,
            }),
            Some(_) => {}
        }
    }
    for symbol in broker_net.keys() {
        if !local_net.contains_key(symbol) {
            report.untracked.push(symbol.to_string());
        }
    }
    report
}

/// Audits the store's view of open exposure against the broker's.
///
/// It only reports; nothing is opened or closed on either side.
pub struct StateReconciler {
    broker: Arc<dyn Broker>,
    store: Arc<dyn Store>,
}

impl StateReconciler {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn Store>) -> Self {
        Self { broker, store }
    }

    pub async fn run_reconciliation(&self) -> Result<ReconciliationReport, EngineError> {
        let (broker_result, local_result) =
            tokio::join!(self.broker.get_open_positions(), self.store.load_open_positions());
        let local = local_result?;
        let mut report = compare(&local.rows, &broker_result?);
        report.unreadable = local.rejected.into_iter().map(|row| row.id).collect();

        for symbol in &report.ghosts {
            tracing::error!(%symbol, "ghost position: open in the store but flat at the broker");
        }
        for symbol in &report.untracked {
            tracing::error!(%symbol, "untracked position: held at the broker but unknown to the store");
        }
        for m in &report.mismatched {
            tracing::warn!(symbol = %m.symbol, local = %m.local, broker = %m.broker, "quantity discrepancy");
        }
        for id in &report.unreadable {
            tracing::error!(position_id = %id, "open position row is unreadable; its exposure is not compared");
        }
        if report.is_clean() {
            tracing::info!("reconciliation clean");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::NewPosition;
    use rust_decimal_macros::dec;

    fn local(symbol: &str, side: OrderSide, quantity: Decimal) -> Position {
        let (stop, target) = match side {
            OrderSide::Buy => (dec!(1900), dec!(2100)),
            OrderSide::Sell => (dec!(2100), dec!(1900)),
        };
        Position::open(NewPosition {
            strategy_id: 1,
            symbol: symbol.to_string(),
            side,
            entry_price: dec!(2000),
            quantity,
            stop_loss: stop,
            take_profit: target,
            entry_time: Utc::now(),
        })
        .unwrap()
    }

    fn remote(symbol: &str, side: OrderSide, quantity: Decimal) -> BrokerPosition {
        BrokerPosition {
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price: dec!(2000),
        }
    }

    #[test]
    fn matching_exposure_is_clean() {
        let report = compare(
            &[local("XAUUSD", OrderSide::Buy, dec!(0.1)), local("XAUUSD", OrderSide::Buy, dec!(0.2))],
            &[remote("XAUUSD", OrderSide::Buy, dec!(0.3))],
        );
        assert!(report.is_clean());
    }

    #[test]
    fn ghosts_and_untracked_are_reported() {
        let report = compare(
            &[local("XAUUSD", OrderSide::Sell, dec!(0.1))],
            &[remote("XAGUSD", OrderSide::Buy, dec!(1))],
        );
        assert_eq!(report.ghosts, vec!["XAUUSD"]);
        assert_eq!(report.untracked, vec!["XAGUSD"]);
    }

    #[test]
    fn net_quantity_differences_are_reported() {
        let report = compare(
            &[local("XAUUSD", OrderSide::Buy, dec!(0.1))],
            &[remote("XAUUSD", OrderSide::Sell, dec!(0.1))],
        );
        assert_eq!(
            report.mismatched,
            vec![QuantityMismatch {
                symbol: "XAUUSD".to_string(),
                local: dec!(0.1),
                broker: dec!(-0.1),
            }]
        );
    }
}

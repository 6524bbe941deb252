use crate::error::BrokerError;
use crate::{Broker, BrokerPosition};
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use configuration::SimulatedSettings;
use core_types::{OrderAck, OrderRequest, OrderSide, OrderStatus, RawBar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// Broker calls that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOp {
    CurrentPrice,
    MarketData,
    PlaceOrder,
    ClosePosition,
    Balance,
    OpenPositions,
}

#[derive(Debug, Default)]
struct Market {
    price: Decimal,
    bars: Vec<RawBar>,
    /// Bars were injected; the random walk leaves this market alone.
    scripted: bool,
}

#[derive(Debug)]
struct SimState {
    rng: StdRng,
    balance: Decimal,
    markets: HashMap<String, Market>,
    positions: Vec<BrokerPosition>,
    orders: Vec<OrderRequest>,
    failures: HashMap<BrokerOp, VecDeque<BrokerError>>,
    /// Price the next order fills at, simulating slippage through a gap.
    next_fill: Option<Decimal>,
    next_order_id: u64,
}

impl SimState {
    fn take_failure(&mut self, op: BrokerOp) -> Result<(), BrokerError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory broker with a seeded random-walk price feed.
///
/// Unscripted symbols start at `start_price` and gain one bar per
/// `get_market_data` call. Orders fill immediately at the last price and
/// closing a symbol realizes its PnL into the balance.
#[derive(Debug)]
pub struct SimulatedBroker {
    start_price: Decimal,
    volatility: f64,
    state: Mutex<SimState>,
}

impl SimulatedBroker {
    pub fn new(settings: &SimulatedSettings) -> Self {
        Self {
            start_price: settings.start_price,
            volatility: settings.volatility,
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(settings.seed),
                balance: settings.initial_balance,
                markets: HashMap::new(),
                positions: Vec::new(),
                orders: Vec::new(),
                failures: HashMap::new(),
                next_fill: None,
                next_order_id: 1,
            }),
        }
    }

    /// Sets the quoted price without touching the bar history.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.lock().await;
        let start = self.start_price;
        state.markets.entry(symbol.to_string()).or_insert_with(|| new_market(start)).price = price;
    }

    /// Replaces the bar history with `bars`; the last close becomes the price.
    pub async fn set_bars(&self, symbol: &str, bars: Vec<RawBar>) {
        let mut state = self.state.lock().await;
        let start = self.start_price;
        let market = state.markets.entry(symbol.to_string()).or_insert_with(|| new_market(start));
        if let Some(close) = bars.last().and_then(|b| b.close) {
            market.price = close;
        }
        market.bars = bars;
        market.scripted = true;
    }

    /// Fills the next order at `price` and moves the market there.
    pub async fn gap_next_fill(&self, price: Decimal) {
        self.state.lock().await.next_fill = Some(price);
    }

    /// Queues `err` as the result of the next call to `op`.
    pub async fn fail_next(&self, op: BrokerOp, err: BrokerError) {
        self.state.lock().await.failures.entry(op).or_default().push_back(err);
    }

    /// Every order accepted so far, oldest first.
    pub async fn orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.orders.clone()
    }

    fn advance(&self, rng: &mut StdRng, market: &mut Market, step: Duration) -> Result<(), BrokerError> {
        let open = market.price.to_f64().ok_or_else(|| invalid_price(market.price))?;
        let shock: f64 = rng.gen_range(-1.0..=1.0) * 3f64.sqrt();
        let close = open * (1.0 + self.volatility * shock);
        let wick: f64 = rng.gen_range(0.0..=0.5) * self.volatility;
        let high = open.max(close) * (1.0 + wick);
        let low = open.min(close) * (1.0 - wick);
        let volume: f64 = rng.gen_range(50.0..500.0);

        let timestamp = match market.bars.last().and_then(|b| b.timestamp) {
            Some(last) => last + step,
            None => Utc::now()
                .duration_trunc(step)
                .map_err(|e| BrokerError::InvalidData(format!("Cannot align bar time: {e}")))?,
        };

        let close_dec = to_price(close)?;
        market.bars.push(RawBar {
            timestamp: Some(timestamp),
            open: Some(market.price),
            high: Some(to_price(high)?),
            low: Some(to_price(low)?),
            close: Some(close_dec),
            volume: Some(to_price(volume)?),
        });
        market.price = close_dec;
        Ok(())
    }

    /// Backfills `limit` bars ending before now, then the live bar follows.
    fn backfill(&self, rng: &mut StdRng, market: &mut Market, step: Duration, limit: usize) -> Result<(), BrokerError> {
        let span = i32::try_from(limit)
            .ok()
            .and_then(|n| step.checked_mul(n))
            .ok_or_else(|| BrokerError::InvalidData(format!("Bar limit {limit} is too large")))?;
        let anchor: DateTime<Utc> = Utc::now()
            .duration_trunc(step)
            .map_err(|e| BrokerError::InvalidData(format!("Cannot align bar time: {e}")))?
            - span;
        market.bars.push(RawBar {
            timestamp: Some(anchor),
            open: Some(market.price),
            high: Some(market.price),
            low: Some(market.price),
            close: Some(market.price),
            volume: Some(Decimal::ZERO),
        });
        while market.bars.len() < limit {
            self.advance(rng, market, step)?;
        }
        Ok(())
    }
}

fn new_market(price: Decimal) -> Market {
    Market {
        price,
        ..Default::default()
    }
}

fn invalid_price(price: Decimal) -> BrokerError {
    BrokerError::InvalidData(format!("Unrepresentable price {price}"))
}

fn to_price(value: f64) -> Result<Decimal, BrokerError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .ok_or_else(|| BrokerError::InvalidData(format!("Random walk produced {value}")))
}

/// Parses `1m`, `15m`, `1h`, `4h`, `1d` style timeframes.
pub fn parse_timeframe(timeframe: &str) -> Result<Duration, BrokerError> {
    let invalid = || BrokerError::InvalidData(format!("Unsupported timeframe: {timeframe}"));
    let split = timeframe.len().checked_sub(1).ok_or_else(invalid)?;
    let (count, unit) = timeframe.split_at(split);
    let count: i64 = count.parse().map_err(|_| invalid())?;
    if count <= 0 {
        return Err(invalid());
    }
    match unit {
        "m" => Duration::try_minutes(count),
        "h" => Duration::try_hours(count),
        "d" => Duration::try_days(count),
        "w" => Duration::try_weeks(count),
        _ => None,
    }
    .ok_or_else(invalid)
}

#[async_trait]
impl Broker for SimulatedBroker {
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::CurrentPrice)?;
        let start = self.start_price;
        Ok(state.markets.entry(symbol.to_string()).or_insert_with(|| new_market(start)).price)
    }

    async fn get_market_data(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<RawBar>, BrokerError> {
        let mut guard = self.state.lock().await;
        guard.take_failure(BrokerOp::MarketData)?;
        let step = parse_timeframe(timeframe)?;

        let state = &mut *guard;
        let start = self.start_price;
        let market = state.markets.entry(symbol.to_string()).or_insert_with(|| new_market(start));
        if !market.scripted {
            if market.bars.is_empty() {
                self.backfill(&mut state.rng, market, step, limit)?;
            } else {
                self.advance(&mut state.rng, market, step)?;
            }
        }

        let skip = market.bars.len().saturating_sub(limit);
        Ok(market.bars[skip..].to_vec())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::PlaceOrder)?;
        if order.quantity <= Decimal::ZERO {
            return Err(BrokerError::Rejected {
                status: 400,
                message: format!("Invalid quantity {}", order.quantity),
            });
        }

        let start = self.start_price;
        let gap = state.next_fill.take();
        let market = state.markets.entry(order.symbol.clone()).or_insert_with(|| new_market(start));
        if let Some(fill) = gap {
            market.price = fill;
        }
        let price = market.price;
        let broker_order_id = format!("SIM-{}", state.next_order_id);
        state.next_order_id += 1;
        state.orders.push(order.clone());
        state.positions.push(BrokerPosition {
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            entry_price: price,
        });

        tracing::debug!(%broker_order_id, symbol = %order.symbol, side = %order.side, %price, "simulated fill");
        Ok(OrderAck {
            broker_order_id,
            client_order_id: order.client_order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            status: OrderStatus::Executed,
            fill_price: Some(price),
            quantity: order.quantity,
            timestamp: Utc::now(),
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<bool, BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::ClosePosition)?;

        let (closing, remaining): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.positions).into_iter().partition(|p| p.symbol == symbol);
        state.positions = remaining;
        if closing.is_empty() {
            return Ok(false);
        }

        let price = state.markets.get(symbol).map(|m| m.price).unwrap_or(self.start_price);
        let realized: Decimal = closing
            .iter()
            .map(|p| {
                let gross = (price - p.entry_price) * p.quantity;
                match p.side {
                    OrderSide::Buy => gross,
                    OrderSide::Sell => -gross,
                }
            })
            .sum();
        state.balance += realized;
        tracing::debug!(symbol, %price, %realized, "simulated close");
        Ok(true)
    }

    async fn get_account_balance(&self) -> Result<Decimal, BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::Balance)?;
        Ok(state.balance)
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let mut state = self.state.lock().await;
        state.take_failure(BrokerOp::OpenPositions)?;
        Ok(state.positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderType;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn broker() -> SimulatedBroker {
        SimulatedBroker::new(&SimulatedSettings::default())
    }

    fn order(side: OrderSide, quantity: Decimal) -> OrderRequest {
        OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: "XAUUSD".to_string(),
            order_type: OrderType::Market,
            side,
            quantity,
            stop_loss: None,
            take_profit: None,
        }
    }

    #[test]
    fn timeframes_parse() {
        assert_eq!(parse_timeframe("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_timeframe("4h").unwrap(), Duration::hours(4));
        assert_eq!(parse_timeframe("1d").unwrap(), Duration::days(1));
        assert!(parse_timeframe("h").is_err());
        assert!(parse_timeframe("0m").is_err());
        assert!(parse_timeframe("").is_err());
        assert!(parse_timeframe("3y").is_err());
    }

    #[tokio::test]
    async fn random_walk_is_reproducible_and_ordered() {
        let a = broker().get_market_data("XAUUSD", "1h", 50).await.unwrap();
        let b = broker().get_market_data("XAUUSD", "1h", 50).await.unwrap();
        assert_eq!(a.len(), 50);

        let closes = |bars: &[RawBar]| bars.iter().map(|b| b.close).collect::<Vec<_>>();
        assert_eq!(closes(&a), closes(&b));
        assert!(a.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(a.iter().all(|bar| bar.missing_fields().is_empty()));
    }

    #[tokio::test]
    async fn each_poll_adds_one_bar() {
        let sim = broker();
        let first = sim.get_market_data("XAUUSD", "1m", 10).await.unwrap();
        let second = sim.get_market_data("XAUUSD", "1m", 10).await.unwrap();
        assert_eq!(second.len(), 10);
        assert_eq!(first[1..], second[..9]);
        assert_eq!(sim.get_current_price("XAUUSD").await.unwrap(), second[9].close.unwrap());
    }

    #[tokio::test]
    async fn scripted_bars_are_returned_verbatim() {
        let sim = broker();
        let bars = vec![
            RawBar { close: Some(dec!(2001)), ..Default::default() },
            RawBar { close: Some(dec!(2002)), ..Default::default() },
        ];
        sim.set_bars("XAUUSD", bars.clone()).await;
        assert_eq!(sim.get_market_data("XAUUSD", "1h", 10).await.unwrap(), bars);
        assert_eq!(sim.get_current_price("XAUUSD").await.unwrap(), dec!(2002));
    }

    #[tokio::test]
    async fn fills_at_last_price_and_realizes_on_close() {
        let sim = broker();
        sim.set_price("XAUUSD", dec!(2000)).await;
        let ack = sim.place_order(&order(OrderSide::Sell, dec!(0.5))).await.unwrap();
        assert_eq!(ack.status, OrderStatus::Executed);
        assert_eq!(ack.fill_price, Some(dec!(2000)));
        assert_eq!(sim.get_open_positions().await.unwrap().len(), 1);

        sim.set_price("XAUUSD", dec!(1990)).await;
        assert!(sim.close_position("XAUUSD").await.unwrap());
        assert_eq!(sim.get_account_balance().await.unwrap(), dec!(10005));
        assert!(!sim.close_position("XAUUSD").await.unwrap());
    }

    #[tokio::test]
    async fn gapped_fill_moves_the_market() {
        let sim = broker();
        sim.set_price("XAUUSD", dec!(2000)).await;
        sim.gap_next_fill(dec!(2004.5)).await;
        let ack = sim.place_order(&order(OrderSide::Buy, dec!(0.1))).await.unwrap();
        assert_eq!(ack.fill_price, Some(dec!(2004.5)));
        assert_eq!(sim.get_current_price("XAUUSD").await.unwrap(), dec!(2004.5));

        let next = sim.place_order(&order(OrderSide::Buy, dec!(0.1))).await.unwrap();
        assert_eq!(next.fill_price, Some(dec!(2004.5)));
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let sim = broker();
        sim.fail_next(BrokerOp::PlaceOrder, BrokerError::Transient("timeout".into())).await;
        assert!(sim.place_order(&order(OrderSide::Buy, dec!(0.01))).await.is_err());
        assert!(sim.place_order(&order(OrderSide::Buy, dec!(0.01))).await.is_ok());
        assert_eq!(sim.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let err = broker().place_order(&order(OrderSide::Buy, Decimal::ZERO)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { status: 400, .. }));
    }
}

use async_trait::async_trait;
use configuration::{BrokerConfig, BrokerMode};
use core_types::{OrderAck, OrderRequest, OrderSide, RawBar};
use rust_decimal::Decimal;
use std::sync::Arc;

mod auth;
pub mod error;
pub mod live;
pub mod responses;
pub mod retry;
pub mod simulated;

// --- Public API ---
pub use error::BrokerError;
pub use live::LiveBroker;
pub use retry::{RetryPolicy, with_retry};
pub use simulated::{BrokerOp, SimulatedBroker};

/// An exposure as the broker sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// The broker capability the engine trades through.
/// Live and simulated implementations are interchangeable behind it.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Latest traded price for `symbol`.
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, BrokerError>;

    /// Up to `limit` most recent bars, oldest first. Bars are returned as
    /// reported; completeness is checked when the series is built.
    async fn get_market_data(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<RawBar>, BrokerError>;

    /// Places a bracket order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError>;

    /// Flattens every exposure on `symbol`. `false` means the broker had nothing to close.
    async fn close_position(&self, symbol: &str) -> Result<bool, BrokerError>;

    async fn get_account_balance(&self) -> Result<Decimal, BrokerError>;

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
}

/// Builds the broker selected by `broker.mode`.
pub fn connect_broker(config: &BrokerConfig) -> Result<Arc<dyn Broker>, BrokerError> {
    match config.mode {
        BrokerMode::Live => {
            tracing::info!(base_url = %config.base_url, "connecting live broker");
            Ok(Arc::new(LiveBroker::new(config)?))
        }
        BrokerMode::Simulated => {
            tracing::info!(seed = config.simulated.seed, "using simulated broker");
            Ok(Arc::new(SimulatedBroker::new(&config.simulated)))
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Broker error: {0}")]
    Broker(#[from] api_client::BrokerError),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Market data error: {0}")]
    Indicator(#[from] indicators::IndicatorError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error(transparent)]
    Core(#[from] core_types::CoreError),

    #[error("Strategy {0} not found.")]
    StrategyNotFound(i64),

    #[error("Engine task failed: {0}")]
    Task(String),
}

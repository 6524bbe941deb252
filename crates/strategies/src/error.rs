use indicators::IndicatorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(#[from] IndicatorError),

    #[error("Position value cannot be compared with indicators: {0}")]
    InvalidPosition(String),
}

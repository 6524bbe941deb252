use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    /// The input series is malformed. Nothing is computed.
    #[error("Invalid price series: {0}")]
    Validation(String),

    #[error("Invalid indicator parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl From<CoreError> for IndicatorError {
    fn from(err: CoreError) -> Self {
        IndicatorError::Validation(err.to_string())
    }
}

pub(crate) fn check_period(name: &'static str, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameter {
            name,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

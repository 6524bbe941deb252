use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Strategy configuration error: {0}")]
    Configuration(String),

    #[error("Position invariant violated: {0}")]
    InvalidPosition(String),

    #[error("Position {0} is already closed")]
    AlreadyClosed(uuid::Uuid),
}

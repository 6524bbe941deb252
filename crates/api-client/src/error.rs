use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    /// Network failure, timeout, HTTP 5xx or 429. Retried with backoff.
    #[error("Transient broker failure: {0}")]
    Transient(String),

    #[error("The broker rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to deserialize the broker response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from broker: {0}")]
    InvalidData(String),

    #[error("Broker client is misconfigured: {0}")]
    Configuration(String),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_))
    }

    /// Maps a non-success HTTP status to the retry class it belongs to.
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 || (500..600).contains(&status) {
            BrokerError::Transient(format!("HTTP {status}: {message}"))
        } else {
            BrokerError::Rejected { status, message }
        }
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            BrokerError::Configuration(err.to_string())
        } else if err.is_decode() {
            BrokerError::Deserialization(err.to_string())
        } else if let Some(status) = err.status() {
            BrokerError::from_status(status.as_u16(), err.to_string())
        } else {
            // connect, timeout, request and body errors
            BrokerError::Transient(err.to_string())
        }
    }
}

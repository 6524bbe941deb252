use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

/// The one status set used for every order and trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Executed,
    Closed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

/// Why a position left the OPEN state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloseReason {
    Stop,
    Target,
    Signal,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Stop => "STOP",
            CloseReason::Target => "TARGET",
            CloseReason::Signal => "SIGNAL",
        }
    }
}

/// Which signal path a strategy is evaluated with.
///
/// `Batch` is the coarse RSI + fast/slow EMA rule used by the multi-strategy
/// loop. `Confluence` is the full trend/RSI/MACD/Bollinger/support-resistance
/// rule set with its own exit gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalGranularity {
    #[default]
    Batch,
    Confluence,
}

impl SignalGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalGranularity::Batch => "batch",
            SignalGranularity::Confluence => "confluence",
        }
    }
}

macro_rules! impl_text_enum {
    ($ty:ty, $what:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Ok($variant),)+
                    _ => Err(CoreError::InvalidInput($what.to_string(), s.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_text_enum!(OrderSide, "order side", { "BUY" => OrderSide::Buy, "SELL" => OrderSide::Sell });
impl_text_enum!(OrderType, "order type", { "MARKET" => OrderType::Market, "LIMIT" => OrderType::Limit });
impl_text_enum!(OrderStatus, "order status", {
    "PENDING" => OrderStatus::Pending,
    "EXECUTED" => OrderStatus::Executed,
    "CLOSED" => OrderStatus::Closed,
    "CANCELLED" => OrderStatus::Cancelled,
    "FAILED" => OrderStatus::Failed,
});
impl_text_enum!(CloseReason, "close reason", {
    "STOP" => CloseReason::Stop,
    "TARGET" => CloseReason::Target,
    "SIGNAL" => CloseReason::Signal,
});
impl_text_enum!(SignalGranularity, "signal granularity", {
    "BATCH" => SignalGranularity::Batch,
    "CONFLUENCE" => SignalGranularity::Confluence,
});

pub mod enums;
pub mod error;
pub mod position;
pub mod strategy;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CloseReason, OrderSide, OrderStatus, OrderType, SignalGranularity};
pub use error::CoreError;
pub use position::{NewPosition, Position, PositionExit};
pub use strategy::{NewStrategy, StrategyConfig, StrategyRecord, StrategyUpdate};
pub use structs::{DailyRiskState, OrderAck, OrderRequest, PriceBar, RawBar, TradeRecord};

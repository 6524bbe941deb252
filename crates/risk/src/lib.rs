pub mod error;
pub mod governor;
pub mod window;

pub use error::RiskError;
pub use governor::{ExitPrices, LimitWindow, RiskDecision, RiskGovernor, RiskLimitBreached};
pub use window::RiskWindow;

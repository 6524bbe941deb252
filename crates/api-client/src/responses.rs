use crate::error::BrokerError;
use chrono::{TimeZone, Utc};
use core_types::{OrderAck, OrderRequest, OrderSide, OrderStatus, RawBar};
use rust_decimal::Decimal;
use serde::Deserialize;

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON camelCase to Rust snake_case.

/// `GET /api/v1/ticker/price`
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub symbol: String,
    pub price: Decimal,
}

/// One element of `GET /api/v1/klines`. The broker may omit any field, so
/// everything is optional here and validated by the indicator layer.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineResponse {
    /// Open time in epoch milliseconds.
    pub timestamp: Option<i64>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl KlineResponse {
    pub fn into_raw_bar(self) -> Result<RawBar, BrokerError> {
        let timestamp = match self.timestamp {
            Some(ms) => Some(
                Utc.timestamp_millis_opt(ms)
                    .single()
                    .ok_or_else(|| BrokerError::InvalidData(format!("Invalid kline timestamp: {ms}")))?,
            ),
            None => None,
        };
        Ok(RawBar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// The response from a successful `POST /api/v1/order` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub status: String,
    /// Average fill price; absent while the order is still working.
    pub price: Option<Decimal>,
    pub executed_qty: Option<Decimal>,
}

impl OrderResponse {
    pub fn into_ack(self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let status = match self.status.to_ascii_uppercase().as_str() {
            "FILLED" | "EXECUTED" => OrderStatus::Executed,
            "NEW" | "PENDING" | "PARTIALLY_FILLED" => OrderStatus::Pending,
            "CANCELED" | "CANCELLED" | "EXPIRED" => OrderStatus::Cancelled,
            "REJECTED" => {
                return Err(BrokerError::Rejected {
                    status: 200,
                    message: format!("order {} rejected by broker", self.order_id),
                });
            }
            other => return Err(BrokerError::InvalidData(format!("Unknown order status: {other}"))),
        };
        Ok(OrderAck {
            broker_order_id: self.order_id,
            client_order_id: request.client_order_id,
            symbol: self.symbol,
            side: self.side,
            status,
            fill_price: self.price,
            quantity: self.executed_qty.unwrap_or(request.quantity),
            timestamp: Utc::now(),
        })
    }
}

/// `GET /api/v1/account`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub balance: Decimal,
}

/// One element of `GET /api/v1/openPositions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPositionResponse {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// `POST /api/v1/position/close`
#[derive(Debug, Clone, Deserialize)]
pub struct ClosePositionResponse {
    pub success: bool,
}

/// Represents an error response from the broker API.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub code: Option<i64>,
    #[serde(alias = "msg")]
    pub message: String,
}

impl ErrorResponse {
    /// The broker's message, prefixed with its error code when it sent one.
    pub fn describe(self) -> String {
        match self.code {
            Some(code) => format!("[{code}] {}", self.message),
            None => self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderType;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            client_order_id: Default::default(),
            symbol: "XAUUSD".into(),
            order_type: OrderType::Market,
            side: OrderSide::Buy,
            quantity: dec!(0.05),
            stop_loss: Some(dec!(1970)),
            take_profit: Some(dec!(2060)),
        }
    }

    #[test]
    fn kline_with_missing_close_stays_raw() {
        let json = r#"[{"timestamp": 1704067200000, "open": "2000.5", "high": 2001, "low": "1999.1", "volume": "12"}]"#;
        let klines: Vec<KlineResponse> = serde_json::from_str(json).unwrap();
        let raw = klines.into_iter().next().unwrap().into_raw_bar().unwrap();
        assert_eq!(raw.open, Some(dec!(2000.5)));
        assert_eq!(raw.high, Some(dec!(2001)));
        assert_eq!(raw.missing_fields(), vec!["close"]);
    }

    #[test]
    fn filled_order_becomes_executed_ack() {
        let json = r#"{"orderId": "A-1", "symbol": "XAUUSD", "side": "BUY", "status": "FILLED", "price": "2000.10", "executedQty": "0.05"}"#;
        let response: OrderResponse = serde_json::from_str(json).unwrap();
        let ack = response.into_ack(&request()).unwrap();
        assert_eq!(ack.status, OrderStatus::Executed);
        assert_eq!(ack.fill_price, Some(dec!(2000.10)));
        assert_eq!(ack.broker_order_id, "A-1");
    }

    #[test]
    fn rejected_status_is_an_error() {
        let json = r#"{"orderId": "A-2", "symbol": "XAUUSD", "side": "SELL", "status": "REJECTED"}"#;
        let response: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(response.into_ack(&request()), Err(BrokerError::Rejected { .. })));
    }

    #[test]
    fn error_body_accepts_short_field_name() {
        let err: ErrorResponse = serde_json::from_str(r#"{"code": -1013, "msg": "Invalid quantity"}"#).unwrap();
        assert_eq!(err.message, "Invalid quantity");
        assert_eq!(err.describe(), "[-1013] Invalid quantity");

        let bare: ErrorResponse = serde_json::from_str(r#"{"message": "Market closed"}"#).unwrap();
        assert_eq!(bare.describe(), "Market closed");
    }
}

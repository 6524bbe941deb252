use crate::auth::sign_request;
use crate::error::BrokerError;
use crate::responses::{
    AccountResponse, ClosePositionResponse, ErrorResponse, KlineResponse, OpenPositionResponse, OrderResponse,
    PriceResponse,
};
use crate::retry::{RetryPolicy, with_retry};
use crate::{Broker, BrokerPosition};
use async_trait::async_trait;
use chrono::Utc;
use configuration::BrokerConfig;
use core_types::{OrderAck, OrderRequest, RawBar};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// REST client for the live broker.
///
/// Private endpoints are signed with HMAC-SHA256 over the query string. The
/// timestamp and signature are rebuilt inside every retry attempt so a
/// retried request never carries a stale signature.
#[derive(Clone)]
pub struct LiveBroker {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    retry: RetryPolicy,
}

impl LiveBroker {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BrokerError::Configuration("broker.api_key is required in live mode".to_string()))?;
        let api_secret = config
            .api_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BrokerError::Configuration("broker.api_secret is required in live mode".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            HeaderValue::from_str(api_key).map_err(|e| BrokerError::Configuration(format!("Invalid API key: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_secret,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, BrokerError> {
        with_retry(&self.retry, path, || async {
            let url = format!("{}{}", self.base_url, path);
            let response = self.client.get(&url).query(params).send().await?;
            read_json(response).await
        })
        .await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: BTreeMap<&'static str, String>,
    ) -> Result<T, BrokerError> {
        with_retry(&self.retry, path, || self.signed_attempt(method.clone(), path, &params)).await
    }

    /// One signed request. Timestamp and signature are computed here, right
    /// before the request goes out.
    async fn signed_attempt<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &BTreeMap<&'static str, String>,
    ) -> Result<T, BrokerError> {
        let mut params = params.clone();
        params.insert("timestamp", Utc::now().timestamp_millis().to_string());

        let query_string =
            serde_qs::to_string(&params).map_err(|e| BrokerError::InvalidData(format!("Unencodable parameters: {e}")))?;
        let signature = sign_request(&self.api_secret, &query_string)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);

        let response = self.client.request(method, &url).send().await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BrokerError> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        serde_json::from_str::<T>(&text)
            .map_err(|e| BrokerError::Deserialization(format!("{e}. Original text: {text}")))
    } else {
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(ErrorResponse::describe)
            .unwrap_or(text);
        Err(BrokerError::from_status(status.as_u16(), message))
    }
}

#[async_trait]
impl Broker for LiveBroker {
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        let response: PriceResponse = self
            .get_public("/api/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        if response.price <= Decimal::ZERO {
            return Err(BrokerError::InvalidData(format!(
                "Non-positive price {} for {}",
                response.price, response.symbol
            )));
        }
        Ok(response.price)
    }

    async fn get_market_data(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<RawBar>, BrokerError> {
        let klines: Vec<KlineResponse> = self
            .get_public(
                "/api/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        klines.into_iter().map(KlineResponse::into_raw_bar).collect()
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", order.symbol.clone());
        params.insert("side", order.side.as_str().to_string());
        params.insert("type", order.order_type.as_str().to_string());
        params.insert("quantity", order.quantity.to_string());
        params.insert("clientOrderId", order.client_order_id.to_string());
        if let Some(stop) = order.stop_loss {
            params.insert("stopLoss", stop.to_string());
        }
        if let Some(target) = order.take_profit {
            params.insert("takeProfit", target.to_string());
        }

        let response: OrderResponse = self.send_signed(Method::POST, "/api/v1/order", params).await?;
        let ack = response.into_ack(order)?;
        tracing::info!(
            target: "trades",
            symbol = %ack.symbol,
            side = %ack.side,
            quantity = %ack.quantity,
            fill_price = ?ack.fill_price,
            broker_order_id = %ack.broker_order_id,
            "order placed"
        );
        Ok(ack)
    }

    async fn close_position(&self, symbol: &str) -> Result<bool, BrokerError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        let response: ClosePositionResponse = self.send_signed(Method::POST, "/api/v1/position/close", params).await?;
        Ok(response.success)
    }

    async fn get_account_balance(&self) -> Result<Decimal, BrokerError> {
        let account: AccountResponse = self.send_signed(Method::GET, "/api/v1/account", BTreeMap::new()).await?;
        Ok(account.balance)
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let positions: Vec<OpenPositionResponse> =
            self.send_signed(Method::GET, "/api/v1/openPositions", BTreeMap::new()).await?;
        Ok(positions
            .into_iter()
            .map(|p| BrokerPosition {
                symbol: p.symbol,
                side: p.side,
                quantity: p.quantity,
                entry_price: p.entry_price,
            })
            .collect())
    }
}

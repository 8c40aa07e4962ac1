use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::{Candle, Error, Fill, GatewayError, Order, OrderGateway, OrderSide, Result};

const BASE_URL: &str = "https://api.bybit.com";
const RECV_WINDOW: &str = "5000";

/// REST client for Bybit's V5 API. Implements the live order path.
pub struct BybitClient {
    api_key: String,
    secret: String,
    http: Client,
}

impl BybitClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64
    }

    /// V5 signature: HMAC-SHA256 over `timestamp + api_key + recv_window +
    /// payload`, where payload is the query string (GET) or the raw JSON
    /// body (POST).
    fn sign(&self, timestamp: u64, payload: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let message = format!("{timestamp}{}{RECV_WINDOW}{payload}", self.api_key);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn signed_get(&self, path: &str, query: &str) -> Result<String> {
        let ts = Self::timestamp_ms();
        let url = format!("{BASE_URL}{path}?{query}");

        let resp = self
            .http
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", self.sign(ts, query))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_post(&self, path: &str, body: &serde_json::Value) -> Result<String> {
        let ts = Self::timestamp_ms();
        let payload = body.to_string();
        let url = format!("{BASE_URL}{path}");

        let resp = self
            .http
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", self.sign(ts, &payload))
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }

    /// Read back the average fill price and executed fee for a placed order.
    async fn fetch_execution(&self, pair: &str, order_id: &str) -> Result<OrderDetail> {
        let query = format!("category=spot&symbol={pair}&orderId={order_id}");
        let body = self.signed_get("/v5/order/realtime", &query).await?;
        let resp: ApiResponse<OrderListResult> = serde_json::from_str(&body)?;
        if resp.ret_code != 0 {
            return Err(Error::Exchange(format!(
                "retCode {}: {}",
                resp.ret_code, resp.ret_msg
            )));
        }
        resp.result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| Error::Exchange(format!("order {order_id} not found")))
    }
}

#[async_trait]
impl OrderGateway for BybitClient {
    async fn submit_order(&self, order: &Order) -> Result<Fill, GatewayError> {
        let side = match order.side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let body = serde_json::json!({
            "category": "spot",
            "symbol": order.pair,
            "side": side,
            "orderType": "Market",
            "qty": order.quantity.to_string(),
            "marketUnit": "baseCoin",
            "orderLinkId": order.id,
        });

        debug!(pair = %order.pair, side, qty = order.quantity, "Submitting order to Bybit");
        let text = self
            .signed_post("/v5/order/create", &body)
            .await
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;

        let resp: ApiResponse<OrderCreateResult> =
            serde_json::from_str(&text).map_err(|e| GatewayError::Rejected(e.to_string()))?;
        if resp.ret_code != 0 {
            return Err(map_reject(resp.ret_code, &resp.ret_msg));
        }

        let detail = self
            .fetch_execution(&order.pair, &resp.result.order_id)
            .await
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;

        // avgPrice can be empty while the match engine settles; fall back to
        // the submitted mark price rather than failing the fill.
        let price = detail.avg_price.parse::<f64>().unwrap_or(order.mark_price);
        let quantity = detail.cum_exec_qty.parse::<f64>().unwrap_or(order.quantity);
        let fee = detail.cum_exec_fee.parse::<f64>().unwrap_or(0.0);

        Ok(Fill {
            order_id: resp.result.order_id,
            pair: order.pair.clone(),
            side: order.side,
            price,
            quantity,
            fee,
            timestamp: Utc::now(),
        })
    }
}

/// Known Bybit balance-related retCodes map to `InsufficientFunds`;
/// everything else is a generic rejection.
fn map_reject(ret_code: i64, ret_msg: &str) -> GatewayError {
    match ret_code {
        170131 | 110004 | 110007 | 110012 => {
            GatewayError::InsufficientFunds(format!("retCode {ret_code}: {ret_msg}"))
        }
        _ => GatewayError::Rejected(format!("retCode {ret_code}: {ret_msg}")),
    }
}

/// Fetch up to `limit` (max 1000) most recent closed klines for a spot
/// pair, oldest first. Public endpoint; no credentials required.
pub async fn fetch_klines(pair: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
    let interval = super::interval(timeframe)?;
    let url = format!(
        "{BASE_URL}/v5/market/kline?category=spot&symbol={pair}&interval={interval}&limit={}",
        limit.min(1000)
    );

    let http = Client::builder()
        .use_rustls_tls()
        .build()
        .map_err(|e| Error::Http(e.to_string()))?;
    let resp = http
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;
    let status = resp.status();
    let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(Error::Exchange(format!("HTTP {status}: {body}")));
    }

    parse_klines(pair, &body)
}

/// Parse a V5 kline response into candles, oldest first (Bybit returns
/// newest first).
fn parse_klines(pair: &str, body: &str) -> Result<Vec<Candle>> {
    let resp: ApiResponse<KlineResult> = serde_json::from_str(body)?;
    if resp.ret_code != 0 {
        return Err(Error::Exchange(format!(
            "retCode {}: {}",
            resp.ret_code, resp.ret_msg
        )));
    }

    let mut candles = Vec::with_capacity(resp.result.list.len());
    for row in resp.result.list {
        let [start, open, high, low, close, volume, _turnover] = row;
        let start_ms = start
            .parse::<i64>()
            .map_err(|e| Error::Exchange(format!("bad kline start '{start}': {e}")))?;
        let timestamp = Utc
            .timestamp_millis_opt(start_ms)
            .single()
            .ok_or_else(|| Error::Exchange(format!("bad kline timestamp {start_ms}")))?;
        candles.push(Candle {
            pair: pair.to_string(),
            timestamp,
            open: num(&open, "open")?,
            high: num(&high, "high")?,
            low: num(&low, "low")?,
            close: num(&close, "close")?,
            volume: num(&volume, "volume")?,
        });
    }
    candles.reverse();
    Ok(candles)
}

fn num(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad kline {field} '{value}': {e}")))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: T,
}

#[derive(Deserialize)]
struct OrderCreateResult {
    #[serde(rename = "orderId")]
    order_id: String,
}

#[derive(Deserialize)]
struct OrderListResult {
    list: Vec<OrderDetail>,
}

#[derive(Deserialize)]
struct KlineResult {
    list: Vec<[String; 7]>,
}

#[derive(Deserialize)]
struct OrderDetail {
    #[serde(rename = "avgPrice", default)]
    avg_price: String,
    #[serde(rename = "cumExecQty", default)]
    cum_exec_qty: String,
    #[serde(rename = "cumExecFee", default)]
    cum_exec_fee: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kline_response_oldest_first() {
        let body = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "spot",
                "symbol": "BTCUSDT",
                "list": [
                    ["1700000120000", "102", "103", "101", "102.5", "7", "717"],
                    ["1700000060000", "101", "102", "100", "102", "5", "505"],
                    ["1700000000000", "100", "101", "99", "101", "3", "303"]
                ]
            }
        }"#;
        let candles = parse_klines("BTCUSDT", body).unwrap();
        assert_eq!(candles.len(), 3);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert!(candles[1].timestamp < candles[2].timestamp);
        assert!((candles[0].close - 101.0).abs() < 1e-9);
        assert!((candles[2].close - 102.5).abs() < 1e-9);
    }

    #[test]
    fn kline_error_code_surfaces_as_exchange_error() {
        let body = r#"{"retCode": 10001, "retMsg": "params error", "result": {"category": "", "symbol": "", "list": []}}"#;
        assert!(matches!(
            parse_klines("BTCUSDT", body),
            Err(Error::Exchange(_))
        ));
    }

    #[test]
    fn malformed_kline_number_is_rejected() {
        let body = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {"category": "spot", "symbol": "BTCUSDT", "list": [
                ["1700000000000", "not-a-price", "101", "99", "101", "3", "303"]
            ]}
        }"#;
        assert!(matches!(
            parse_klines("BTCUSDT", body),
            Err(Error::Exchange(_))
        ));
    }

    #[test]
    fn balance_codes_map_to_insufficient_funds() {
        assert!(matches!(
            map_reject(170131, "Balance insufficient"),
            GatewayError::InsufficientFunds(_)
        ));
        assert!(matches!(
            map_reject(10001, "params error"),
            GatewayError::Rejected(_)
        ));
    }

    #[test]
    fn signature_is_stable_for_fixed_inputs() {
        let client = BybitClient::new("key", "secret");
        let a = client.sign(1_700_000_000_000, "category=spot");
        let b = client.sign(1_700_000_000_000, "category=spot");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA-256
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use common::{Candle, CandleFeed, Error, Result};

const STREAM_URL: &str = "wss://stream.bybit.com/v5/public/spot";
const PING_INTERVAL: Duration = Duration::from_secs(20);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bybit V5 public kline stream for a single spot pair, exposed as a
/// blocking [`CandleFeed`].
///
/// Only confirmed (closed) klines are yielded; intra-bar updates are
/// dropped at this boundary so the engine never sees a half-formed candle.
/// Reconnects forever with exponential backoff and keeps the connection
/// alive with the protocol-level ping Bybit expects every 20 seconds.
pub struct BybitStream {
    pair: String,
    topic: String,
    ws: Option<WsStream>,
    backoff: Duration,
}

impl BybitStream {
    pub fn new(pair: impl Into<String>, timeframe: &str) -> Result<Self> {
        let pair = pair.into();
        let topic = format!("kline.{}.{}", super::interval(timeframe)?, pair);
        Ok(Self {
            pair,
            topic,
            ws: None,
            backoff: Duration::from_secs(1),
        })
    }

    /// One connection attempt: dial, subscribe, or sleep out the backoff.
    async fn connect(&mut self) {
        info!(pair = %self.pair, topic = %self.topic, "Connecting to Bybit kline stream");
        match connect_async(STREAM_URL).await {
            Ok((mut ws, _)) => {
                let subscribe =
                    format!(r#"{{"op":"subscribe","args":["{}"]}}"#, self.topic);
                if let Err(e) = ws.send(Message::Text(subscribe)).await {
                    warn!(error = %e, "Subscribe failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                    return;
                }
                self.ws = Some(ws);
                self.backoff = Duration::from_secs(1);
            }
            Err(e) => {
                warn!(error = %e, backoff = ?self.backoff, "WebSocket connect failed, retrying");
                tokio::time::sleep(self.backoff).await;
                self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

#[async_trait]
impl CandleFeed for BybitStream {
    /// Block until the next closed candle arrives. Transient stream errors
    /// are absorbed by reconnecting; this never returns `Ok(None)`.
    async fn next_candle(&mut self) -> Result<Option<Candle>> {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let Some(ws) = self.ws.as_mut() else {
                self.connect().await;
                continue;
            };

            let mut drop_conn = false;
            tokio::select! {
                _ = ping.tick() => {
                    if let Err(e) = ws.send(Message::Text(r#"{"op":"ping"}"#.into())).await {
                        warn!(error = %e, "Ping failed — reconnecting");
                        drop_conn = true;
                    }
                }
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_kline_message(&self.pair, &text) {
                            Ok(Some(candle)) => return Ok(Some(candle)),
                            Ok(None) => {} // ack, pong, or unconfirmed bar
                            Err(e) => {
                                warn!(error = %e, "Failed to parse kline message");
                            }
                        }
                    }
                    Some(Ok(_)) => {} // binary/ping/pong frames
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error — reconnecting");
                        drop_conn = true;
                    }
                    None => {
                        warn!("WebSocket stream closed — reconnecting");
                        drop_conn = true;
                    }
                }
            }
            if drop_conn {
                self.ws = None;
            }
        }
    }
}

// ─── Bybit kline JSON parsing ────────────────────────────────────────────────

#[derive(Deserialize)]
struct KlineMessage {
    data: Vec<KlineData>,
}

#[derive(Deserialize)]
struct KlineData {
    start: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
    confirm: bool,
}

/// Returns the first confirmed candle in the message, `None` for anything
/// that is not a closed kline (acks, pongs, intra-bar updates).
fn parse_kline_message(pair: &str, text: &str) -> Result<Option<Candle>> {
    // Kline pushes carry a "topic" of the form "kline.<interval>.<symbol>".
    let value: serde_json::Value = serde_json::from_str(text)?;
    let is_kline = value
        .get("topic")
        .and_then(|t| t.as_str())
        .is_some_and(|t| t.starts_with("kline."));
    if !is_kline {
        return Ok(None);
    }

    let message: KlineMessage = serde_json::from_value(value)?;
    let Some(k) = message.data.into_iter().find(|k| k.confirm) else {
        return Ok(None);
    };

    let timestamp = Utc
        .timestamp_millis_opt(k.start)
        .single()
        .ok_or_else(|| Error::Feed(format!("bad kline start {}", k.start)))?;

    Ok(Some(Candle {
        pair: pair.to_string(),
        timestamp,
        open: num(&k.open, "open")?,
        high: num(&k.high, "high")?,
        low: num(&k.low, "low")?,
        close: num(&k.close, "close")?,
        volume: num(&k.volume, "volume")?,
    }))
}

fn num(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::Feed(format!("bad kline {field} '{value}': {e}")))
}

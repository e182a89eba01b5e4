//! Binance futures WebSocket adapter for closed kline (candlestick) bars.
//!
//! Subscribes to `<symbol>@kline_<interval>` on the futures stream host, drops
//! partial bars and hands every closed bar to the divergence consumer over an
//! mpsc channel. Reconnects forever with capped backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::PriceBar;
use crate::error::{MonitorError, Result};
use crate::exchange::PriceBarStream;

pub const BINANCE_FSTREAM_URL: &str = "wss://fstream.binance.com/ws";

const DEFAULT_WS_PORT: u16 = 443;

/// How often to send ping frames
const PING_INTERVAL_SECS: u64 = 30;

/// Maximum reconnection delay
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP CONNECT proxy taken from the usual environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProxyEndpoint {
    host: String,
    port: u16,
}

impl ProxyEndpoint {
    fn from_env() -> Option<Self> {
        ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .and_then(|raw| Self::parse(&raw))
    }

    /// Accepts "http://127.0.0.1:7897" as well as a bare "127.0.0.1:7897"
    fn parse(raw: &str) -> Option<Self> {
        let url = if raw.contains("://") {
            Url::parse(raw).ok()?
        } else {
            Url::parse(&format!("http://{}", raw)).ok()?
        };

        Some(Self {
            host: url.host_str()?.to_string(),
            port: url.port().unwrap_or(8080),
        })
    }

    /// Open a TCP tunnel to `target_host:target_port` through this proxy
    async fn tunnel(&self, target_host: &str, target_port: u16) -> Result<TcpStream> {
        debug!(
            "Tunnelling to {}:{} via proxy {}:{}",
            target_host, target_port, self.host, self.port
        );

        let proxy_addr = format!("{}:{}", self.host, self.port);
        let stream = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect(&proxy_addr),
        )
        .await
        .map_err(|_| MonitorError::Internal(format!("Proxy connection timeout: {}", proxy_addr)))??;

        let request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nConnection: keep-alive\r\n\r\n",
            host = target_host,
            port = target_port
        );

        let (reader, mut writer) = stream.into_split();
        writer.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(reader);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).await?;
        if !status_line.contains("200") {
            return Err(MonitorError::Internal(format!(
                "Proxy CONNECT failed: {}",
                status_line.trim()
            )));
        }

        // Drain headers up to the blank line
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            if line.trim().is_empty() {
                break;
            }
        }

        reader
            .into_inner()
            .reunite(writer)
            .map_err(|e| MonitorError::Internal(format!("Failed to reunite stream: {}", e)))
    }
}

/// Connect the WebSocket, tunnelling through a proxy when one is configured
async fn connect_websocket(url: &Url) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let host = url
        .host_str()
        .ok_or_else(|| MonitorError::Internal(format!("WebSocket URL has no host: {}", url)))?;
    let port = url.port().unwrap_or(DEFAULT_WS_PORT);

    if let Some(proxy) = ProxyEndpoint::from_env() {
        info!("Using proxy {}:{} for kline stream", proxy.host, proxy.port);

        let tcp = proxy.tunnel(host, port).await?;
        let connector = native_tls::TlsConnector::new()
            .map_err(|e| MonitorError::Internal(format!("TLS connector error: {}", e)))?;
        let tls = tokio_native_tls::TlsConnector::from(connector)
            .connect(host, tcp)
            .await
            .map_err(|e| MonitorError::Internal(format!("TLS handshake failed: {}", e)))?;

        let (ws, _) =
            tokio_tungstenite::client_async(url.as_str(), MaybeTlsStream::NativeTls(tls)).await?;
        return Ok(ws);
    }

    let (ws, _) = tokio::time::timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        connect_async(url.as_str()),
    )
    .await
    .map_err(|_| MonitorError::Internal("WebSocket connection timeout".to_string()))??;

    Ok(ws)
}

#[derive(Debug, Deserialize)]
struct CombinedStream<T> {
    #[allow(dead_code)]
    stream: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlineData,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Parse a raw or combined-stream kline message into a closed bar.
///
/// Returns `None` for partial bars, unparsable closes and anything that is not a
/// kline event.
pub fn parse_closed_bar(text: &str) -> Option<PriceBar> {
    let event = serde_json::from_str::<CombinedStream<KlineEvent>>(text)
        .map(|wrapper| wrapper.data)
        .or_else(|_| serde_json::from_str::<KlineEvent>(text))
        .ok()?;

    if !event.kline.is_closed {
        return None;
    }

    let close = match event.kline.close.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            warn!(
                "Failed to parse {} kline close '{}'",
                event.symbol, event.kline.close
            );
            return None;
        }
    };
    let close_time =
        DateTime::from_timestamp_millis(event.kline.close_time).unwrap_or_else(Utc::now);

    Some(PriceBar::new(close_time, close))
}

/// Outcome of one connection
enum StreamEnd {
    /// Server closed the connection; reconnect
    Disconnected,
    /// Nobody is listening for bars anymore; stop
    ReceiverDropped,
}

/// Binance futures kline stream for one symbol and interval
pub struct BinanceKlineWebSocket {
    ws_url: String,
    symbol: String,
    interval: String,
    reconnect_delay: Duration,
}

impl BinanceKlineWebSocket {
    /// # Arguments
    /// * `ws_url` - Stream base such as `wss://fstream.binance.com/ws`
    /// * `symbol` - Trading pair like "MYXUSDT"
    /// * `interval` - Binance interval like "15m"
    pub fn new(ws_url: &str, symbol: &str, interval: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    pub fn stream_url(&self) -> String {
        format!(
            "{}/{}@kline_{}",
            self.ws_url,
            self.symbol.to_lowercase(),
            self.interval
        )
    }

    /// Capped linear backoff plus up to 25% jitter
    fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let max_delay = Duration::from_secs(MAX_RECONNECT_DELAY_SECS);
        let delay = (self.reconnect_delay * attempt.clamp(1, 10)).min(max_delay);

        let jitter_range = (delay.as_millis() as u64 / 4).max(1);
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        delay + Duration::from_millis(seed % jitter_range)
    }

    async fn connect_and_stream(&self, tx: &mpsc::Sender<PriceBar>) -> Result<StreamEnd> {
        let url = Url::parse(&self.stream_url())
            .map_err(|e| MonitorError::Internal(format!("Invalid WebSocket URL: {}", e)))?;

        info!("Connecting to kline stream: {}", url);
        let ws_stream = connect_websocket(&url).await?;
        info!("Connected to kline stream");

        let (mut write, mut read) = ws_stream.split();
        let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Some(bar) = parse_closed_bar(&text) else {
                                continue;
                            };
                            debug!("Closed bar {} close={}", bar.close_time, bar.close);
                            if tx.send(bar).await.is_err() {
                                return Ok(StreamEnd::ReceiverDropped);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Received close frame from kline stream");
                            return Ok(StreamEnd::Disconnected);
                        }
                        Some(Err(e)) => return Err(MonitorError::WebSocket(e)),
                        None => {
                            info!("Kline stream ended");
                            return Ok(StreamEnd::Disconnected);
                        }
                        _ => {}
                    }
                }
                _ = ping_interval.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!("Failed to send ping: {}", e);
                        return Ok(StreamEnd::Disconnected);
                    }
                }
                _ = tx.closed() => return Ok(StreamEnd::ReceiverDropped),
            }
        }
    }
}

#[async_trait]
impl PriceBarStream for BinanceKlineWebSocket {
    async fn subscribe_price_bars(&self, tx: mpsc::Sender<PriceBar>) -> Result<()> {
        let mut attempt: u32 = 0;

        info!(
            "Starting kline stream for {} {}",
            self.symbol, self.interval
        );

        loop {
            match self.connect_and_stream(&tx).await {
                Ok(StreamEnd::ReceiverDropped) => {
                    info!("Bar receiver dropped, stopping kline stream");
                    return Ok(());
                }
                Ok(StreamEnd::Disconnected) => {
                    attempt = 0;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    error!("Kline stream error (attempt {}): {}", attempt, e);
                }
            }

            let delay = self.reconnect_backoff(attempt);
            info!("Reconnecting kline stream in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

//! Binance USDⓈ-M futures REST client
//!
//! Snapshot endpoints for open interest and funding rate. Both report numbers as
//! JSON strings, so parsing lives in small pure helpers that the tests exercise
//! directly.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::exchange::{MarketDataSource, Venue};

pub const BINANCE_FAPI_URL: &str = "https://fapi.binance.com";

/// `GET /fapi/v1/openInterest`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterestResponse {
    symbol: String,
    open_interest: String,
    #[serde(default)]
    time: Option<u64>,
}

/// `GET /fapi/v1/premiumIndex`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndexResponse {
    symbol: String,
    last_funding_rate: String,
    #[serde(default)]
    next_funding_time: Option<u64>,
}

/// Binance futures REST client bound to one symbol
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl BinanceFuturesClient {
    /// Create a client for `symbol` (e.g. "MYXUSDT")
    pub fn new(base_url: &str, symbol: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_uppercase(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}?symbol={}", self.base_url, path, self.symbol);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(MonitorError::RateLimited(format!("{} returned {}", path, status)));
        }
        if !status.is_success() {
            return Err(MonitorError::MarketDataUnavailable(format!(
                "{} returned {}",
                path, status
            )));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl MarketDataSource for BinanceFuturesClient {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
    }

    async fn fetch_open_interest(&self) -> Result<f64> {
        let body = self.get_text("/fapi/v1/openInterest").await?;
        parse_open_interest(&body)
    }

    async fn fetch_funding_rate(&self) -> Result<f64> {
        let body = self.get_text("/fapi/v1/premiumIndex").await?;
        parse_funding_rate(&body)
    }
}

/// Extract `openInterest` from an openInterest response body
pub fn parse_open_interest(body: &str) -> Result<f64> {
    let resp: OpenInterestResponse = serde_json::from_str(body)?;
    debug!(
        "{} open interest {} (time={:?})",
        resp.symbol, resp.open_interest, resp.time
    );
    parse_number("openInterest", &resp.open_interest)
}

/// Extract `lastFundingRate` from a premiumIndex response body
pub fn parse_funding_rate(body: &str) -> Result<f64> {
    let resp: PremiumIndexResponse = serde_json::from_str(body)?;
    debug!(
        "{} funding rate {} (next={:?})",
        resp.symbol, resp.last_funding_rate, resp.next_funding_time
    );
    parse_number("lastFundingRate", &resp.last_funding_rate)
}

fn parse_number(field: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| MonitorError::InvalidMarketData(format!("{} '{}': {}", field, raw, e)))?;
    if !value.is_finite() {
        return Err(MonitorError::InvalidMarketData(format!(
            "{} is not finite: {}",
            field, raw
        )));
    }
    Ok(value)
}

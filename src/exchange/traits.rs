use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::PriceBar;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    BinanceFutures,
}

impl Default for Venue {
    fn default() -> Self {
        Self::BinanceFutures
    }
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BinanceFutures => "binance_futures",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request/response snapshots polled by the orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn venue(&self) -> Venue;

    /// Current open interest in contracts
    async fn fetch_open_interest(&self) -> Result<f64>;

    /// Last funding rate as a fraction (0.0001 = 0.01%)
    async fn fetch_funding_rate(&self) -> Result<f64>;
}

/// Long-lived stream of closed price bars
#[async_trait]
pub trait PriceBarStream: Send + Sync {
    /// Deliver every closed bar into `tx` until the receiver is dropped.
    /// Implementations reconnect on their own; returning means the hand-off ended.
    async fn subscribe_price_bars(&self, tx: mpsc::Sender<PriceBar>) -> Result<()>;
}

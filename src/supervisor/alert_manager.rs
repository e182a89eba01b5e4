//! Alert Manager
//!
//! Turns detector signals into human-readable alerts, logs them and broadcasts
//! them to local subscribers. Optional per-kind duplicate suppression keeps a
//! flapping detector from flooding the log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::domain::Signal;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    /// A failure signal fired
    Warning,
    /// A monitor component failed
    Error,
}

impl AlertLevel {
    /// Get emoji prefix for alert level
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "\u{26a0}\u{fe0f}", // warning icon
            AlertLevel::Error => "\u{274c}",           // red X
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert payload
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, component: &str, title: &str, message: &str) -> Self {
        Self {
            level,
            component: component.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Render a signal for `symbol`, keeping the signal itself as metadata
    pub fn from_signal(symbol: &str, signal: &Signal) -> Self {
        let (title, message) = match signal {
            Signal::OiDrop5Min {
                drop_pct,
                old_oi,
                new_oi,
            }
            | Signal::OiDrop1Hour {
                drop_pct,
                old_oi,
                new_oi,
            } => (
                format!("{} open interest drop", symbol),
                format!(
                    "Type: {}\nDrop: {:.2}%\nOpen interest: {} \u{2192} {}",
                    signal.kind(),
                    drop_pct,
                    format_thousands(*old_oi),
                    format_thousands(*new_oi)
                ),
            ),
            Signal::FundingFlipPositive {
                min_rate,
                current_rate,
                change,
            } => (
                format!("{} funding rate flipped positive", symbol),
                format!(
                    "From {:.3}% to {:.3}%\nChange: {:+.3}%",
                    min_rate, current_rate, change
                ),
            ),
            Signal::BearishDivergence {
                price1,
                price2,
                rsi1,
                rsi2,
                timestamp,
            } => (
                format!("{} RSI divergence", symbol),
                format!(
                    "Type: {}\nPrice: {:.4} \u{2192} {:.4}\nRSI: {:.2} \u{2192} {:.2}\nTime: {}",
                    signal.kind(),
                    price1,
                    price2,
                    rsi1,
                    rsi2,
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ),
            ),
        };

        let alert = Alert::new(AlertLevel::Warning, symbol, &title, &message);
        match serde_json::to_value(signal) {
            Ok(metadata) => alert.with_metadata(metadata),
            Err(_) => alert,
        }
    }

    /// Kind discriminator carried in the metadata, if any
    pub fn kind(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("kind")?.as_str()
    }

    /// Single-block text rendering
    pub fn format_text(&self) -> String {
        format!(
            "{} {}\nTime: {}\n{}",
            self.level.emoji(),
            self.title,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message
        )
    }
}

/// Group the integer part of `value` in thousands, no decimals (1234567.8 -> "1,234,568")
pub fn format_thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(rounded.len() + rounded.len() / 3 + 1);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0.0 && rounded != "0" {
        out.insert(0, '-');
    }
    out
}

/// Where detector signals go
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver a signal. Side effect only.
    async fn emit(&self, signal: &Signal);

    /// Report a failed monitor component
    async fn component_failed(&self, _component: &str, _reason: &str) {}
}

/// Configuration for alert manager
#[derive(Debug, Clone, Default)]
pub struct AlertManagerConfig {
    /// Minimum interval between alerts of the same kind; 0 disables suppression
    pub rate_limit_secs: u64,
}

/// Rate limiter state for an alert key
#[derive(Debug)]
struct RateLimitState {
    last_sent: DateTime<Utc>,
    suppressed_count: u32,
}

/// Alert Manager for the monitored instrument
pub struct AlertManager {
    config: AlertManagerConfig,
    symbol: String,
    rate_limits: Arc<RwLock<HashMap<String, RateLimitState>>>,
    event_tx: broadcast::Sender<Alert>,
}

impl AlertManager {
    pub fn new(config: AlertManagerConfig, symbol: &str) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            symbol: symbol.to_string(),
            rate_limits: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Subscribe to alerts
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.event_tx.subscribe()
    }

    fn rate_limit_key(alert: &Alert) -> String {
        format!(
            "{}:{}:{}",
            alert.component,
            alert.level,
            alert.kind().unwrap_or(&alert.title)
        )
    }

    /// Check if alert should be suppressed as a duplicate
    async fn should_rate_limit(&self, alert: &Alert) -> bool {
        if self.config.rate_limit_secs == 0 {
            return false;
        }

        let key = Self::rate_limit_key(alert);
        let now = alert.timestamp;
        let mut limits = self.rate_limits.write().await;

        if let Some(state) = limits.get_mut(&key) {
            let elapsed = now.signed_duration_since(state.last_sent).num_seconds();
            if elapsed < self.config.rate_limit_secs as i64 {
                state.suppressed_count += 1;
                debug!(
                    "Suppressing alert '{}' ({} suppressed)",
                    alert.title, state.suppressed_count
                );
                return true;
            }
            if state.suppressed_count > 0 {
                info!(
                    "Alert '{}' resumes after {} suppressed duplicates",
                    alert.title, state.suppressed_count
                );
            }
            state.last_sent = now;
            state.suppressed_count = 0;
        } else {
            limits.insert(
                key,
                RateLimitState {
                    last_sent: now,
                    suppressed_count: 0,
                },
            );
        }

        false
    }

    /// Log and broadcast an alert
    pub async fn alert(&self, alert: Alert) {
        if self.should_rate_limit(&alert).await {
            return;
        }

        match alert.level {
            AlertLevel::Warning => warn!(
                kind = alert.kind().unwrap_or("-"),
                "[ALERT] {}",
                alert.format_text()
            ),
            AlertLevel::Error => error!(
                "[ALERT] [{}] {}: {}",
                alert.component, alert.title, alert.message
            ),
        }

        let _ = self.event_tx.send(alert);
    }
}

#[async_trait]
impl AlertSink for AlertManager {
    async fn emit(&self, signal: &Signal) {
        self.alert(Alert::from_signal(&self.symbol, signal)).await;
    }

    async fn component_failed(&self, component: &str, reason: &str) {
        self.alert(
            Alert::new(AlertLevel::Error, component, "Component Failed", reason).with_metadata(
                serde_json::json!({
                    "symbol": self.symbol,
                    "error": reason
                }),
            ),
        )
        .await;
    }
}

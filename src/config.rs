use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::adapters::{BINANCE_FAPI_URL, BINANCE_FSTREAM_URL};
use crate::strategy::OrchestratorConfig;
use crate::supervisor::AlertManagerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Perpetual contract symbol (e.g., "MYXUSDT")
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Kline timeframe for the divergence detector
    #[serde(default = "default_interval")]
    pub interval: String,
    /// REST endpoint for open interest and funding snapshots
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// WebSocket endpoint for the kline stream
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

fn default_symbol() -> String {
    "MYXUSDT".to_string()
}

fn default_interval() -> String {
    "15m".to_string()
}

fn default_rest_url() -> String {
    BINANCE_FAPI_URL.to_string()
}

fn default_ws_url() -> String {
    BINANCE_FSTREAM_URL.to_string()
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between snapshot polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds to wait after a failed poll
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
    /// Closed bars buffered between the stream and the detector
    #[serde(default = "default_bar_channel_capacity")]
    pub bar_channel_capacity: usize,
    /// REST request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_backoff() -> u64 {
    60
}

fn default_bar_channel_capacity() -> usize {
    256
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            backoff_secs: default_backoff(),
            bar_channel_capacity: default_bar_channel_capacity(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl MonitorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            backoff: Duration::from_secs(self.backoff_secs),
            bar_channel_capacity: self.bar_channel_capacity,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertsConfig {
    /// Suppress repeats of the same signal kind within this many seconds (0 = off)
    #[serde(default)]
    pub rate_limit_secs: u64,
}

impl AlertsConfig {
    pub fn manager_config(&self) -> AlertManagerConfig {
        AlertManagerConfig {
            rate_limit_secs: self.rate_limit_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Level for this crate's targets; dependencies log at info
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            monitor: MonitorConfig::default(),
            alerts: AlertsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("market.symbol", default_symbol())?
            .set_default("market.interval", default_interval())?
            .set_default("monitor.poll_interval_secs", default_poll_interval())?
            .set_default("monitor.backoff_secs", default_backoff())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FAILWATCH_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // FAILWATCH_MARKET__SYMBOL, FAILWATCH_MONITOR__BACKOFF_SECS, ...
            .add_source(
                Environment::with_prefix("FAILWATCH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Replace the monitored symbol (CLI override)
    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.market.symbol = symbol.to_uppercase();
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.market.symbol.trim().is_empty() {
            errors.push("market.symbol must not be empty".to_string());
        }

        if !self.market.rest_url.starts_with("http") {
            errors.push(format!(
                "market.rest_url must be an http(s) URL: {}",
                self.market.rest_url
            ));
        }

        if url::Url::parse(&self.market.ws_url)
            .map(|u| u.scheme() != "ws" && u.scheme() != "wss")
            .unwrap_or(true)
        {
            errors.push(format!(
                "market.ws_url must be a ws(s) URL: {}",
                self.market.ws_url
            ));
        }

        if self.monitor.poll_interval_secs == 0 {
            errors.push("monitor.poll_interval_secs must be positive".to_string());
        }

        if self.monitor.backoff_secs == 0 {
            errors.push("monitor.backoff_secs must be positive".to_string());
        }

        if self.monitor.bar_channel_capacity == 0 {
            errors.push("monitor.bar_channel_capacity must be positive".to_string());
        }

        if self.monitor.request_timeout_secs == 0 {
            errors.push("monitor.request_timeout_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

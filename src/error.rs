use thiserror::Error;

/// Main error type for the monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MonitorError
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Whether the failure is worth retrying on the next poll
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::Http(_)
                | MonitorError::WebSocket(_)
                | MonitorError::RateLimited(_)
                | MonitorError::Json(_)
                | MonitorError::MarketDataUnavailable(_)
                | MonitorError::InvalidMarketData(_)
                | MonitorError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_data_errors_are_transient() {
        assert!(MonitorError::InvalidMarketData("bad".into()).is_transient());
        assert!(MonitorError::MarketDataUnavailable("503".into()).is_transient());
        assert!(!MonitorError::InvalidConfig("symbol".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = MonitorError::InvalidMarketData("openInterest missing".into());
        assert_eq!(err.to_string(), "Invalid market data: openInterest missing");
    }
}

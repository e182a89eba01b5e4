pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod strategy;
pub mod supervisor;

pub use config::AppConfig;
pub use domain::{PriceBar, Sample, Signal};
pub use error::{MonitorError, Result};
pub use exchange::{MarketDataSource, PriceBarStream, Venue};
pub use strategy::{
    BoundedTimeWindow, FundingRateFlipDetector, OpenInterestDropDetector, PollPolicy,
    RsiDivergenceDetector, SignalOrchestrator,
};
pub use supervisor::{Alert, AlertLevel, AlertManager, AlertManagerConfig, AlertSink};

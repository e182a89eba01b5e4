//! Alert delivery for detector signals

pub mod alert_manager;

pub use alert_manager::{format_thousands, Alert, AlertLevel, AlertManager, AlertManagerConfig, AlertSink};

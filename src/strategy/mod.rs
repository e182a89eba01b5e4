//! Strategy module
//!
//! Failure-signal detection for a single perpetual contract.
//!
//! - `calculations` - RSI and local extrema over plain series
//! - `detectors/` - stateful detectors fed one observation at a time
//! - `orchestrator` - polling loop, bar consumer and alert routing

pub mod calculations;
pub mod detectors;
pub mod orchestrator;

pub use detectors::{
    BoundedTimeWindow, Extrema, FundingRateFlipDetector, OpenInterestDropDetector,
    RsiDivergenceDetector,
};
pub use orchestrator::{
    BarConsumer, OrchestratorConfig, PollAction, PollOutcome, PollPolicy, PollStep,
    SignalOrchestrator, SnapshotPoller,
};

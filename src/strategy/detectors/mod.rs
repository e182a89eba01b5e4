//! Failure signal detectors
//!
//! Each detector owns its history and turns one new observation into at most one
//! signal:
//! - Open interest detector: sharp OI drops over 5 minutes or 1 hour
//! - Funding detector: deep negative funding flipping positive
//! - Divergence detector: bearish RSI divergence on closed bars

pub mod divergence;
pub mod funding;
pub mod open_interest;
pub mod window;

pub use divergence::{Extrema, RsiDivergenceDetector};
pub use funding::FundingRateFlipDetector;
pub use open_interest::OpenInterestDropDetector;
pub use window::BoundedTimeWindow;

pub mod traits;

pub use traits::{MarketDataSource, PriceBarStream, Venue};

#[cfg(test)]
pub use traits::MockMarketDataSource;

use clap::{Parser, Subcommand};
use std::io::{stdout, Write};

use crate::error::Result;
use crate::exchange::MarketDataSource;
use crate::supervisor::format_thousands;

#[derive(Parser)]
#[command(name = "failwatch")]
#[command(version = "0.1.0")]
#[command(about = "Failure-signal monitor for a perpetual futures contract", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config")]
    pub config: String,

    /// Symbol to monitor (overrides market.symbol)
    #[arg(short, long)]
    pub symbol: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Monitor open interest, funding and RSI divergence (default)
    Run,
    /// Fetch and print one open interest / funding snapshot
    Snapshot,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}

/// Print the current open interest and funding rate for `symbol`
pub async fn show_snapshot(source: &dyn MarketDataSource, symbol: &str) -> Result<()> {
    println!("{} snapshot ({})\n", symbol, source.venue());

    print!("  Open interest... ");
    stdout().flush()?;
    match source.fetch_open_interest().await {
        Ok(oi) => println!("\x1b[32m{}\x1b[0m", format_thousands(oi)),
        Err(e) => {
            println!("\x1b[31mFAILED\x1b[0m");
            println!("    Error: {}", e);
        }
    }

    print!("  Funding rate... ");
    stdout().flush()?;
    match source.fetch_funding_rate().await {
        Ok(rate) => println!("\x1b[32m{:.4}%\x1b[0m", rate * 100.0),
        Err(e) => {
            println!("\x1b[31mFAILED\x1b[0m");
            println!("    Error: {}", e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::exchange::{MockMarketDataSource, Venue};

    #[test]
    fn test_run_is_default_command() {
        let cli = Cli::parse_from(["failwatch"]);
        assert_eq!(cli.command(), Commands::Run);
        assert_eq!(cli.config, "config");
        assert!(cli.symbol.is_none());
    }

    #[test]
    fn test_snapshot_with_overrides() {
        let cli = Cli::parse_from(["failwatch", "--symbol", "BTCUSDT", "-c", "/etc/failwatch", "snapshot"]);
        assert_eq!(cli.command(), Commands::Snapshot);
        assert_eq!(cli.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(cli.config, "/etc/failwatch");
    }

    #[test]
    fn test_snapshot_tolerates_fetch_failure() {
        let mut source = MockMarketDataSource::new();
        source.expect_venue().return_const(Venue::BinanceFutures);
        source.expect_fetch_open_interest().times(1).returning(|| Ok(12_345.0));
        source
            .expect_fetch_funding_rate()
            .times(1)
            .returning(|| Err(MonitorError::RateLimited("429".into())));

        tokio_test::assert_ok!(tokio_test::block_on(show_snapshot(&source, "MYXUSDT")));
    }
}

use clap::Parser;
use failwatch::adapters::{BinanceFuturesClient, BinanceKlineWebSocket};
use failwatch::cli::{self, Cli, Commands};
use failwatch::config::{AppConfig, LoggingConfig};
use failwatch::error::{MonitorError, Result};
use failwatch::strategy::SignalOrchestrator;
use failwatch::supervisor::AlertManager;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)?;
    if let Some(symbol) = &cli.symbol {
        config = config.with_symbol(symbol);
    }
    if let Err(errors) = config.validate() {
        return Err(MonitorError::InvalidConfig(errors.join("; ")));
    }

    match cli.command() {
        Commands::Run => {
            init_logging(&config.logging);
            run_monitor(config).await?;
        }
        Commands::Snapshot => {
            init_logging_simple();
            let client = BinanceFuturesClient::new(
                &config.market.rest_url,
                &config.market.symbol,
                config.monitor.request_timeout(),
            )?;
            cli::show_snapshot(&client, client.symbol()).await?;
        }
    }

    Ok(())
}

async fn run_monitor(config: AppConfig) -> Result<()> {
    let symbol = config.market.symbol.clone();
    info!(
        "Starting failwatch for {} ({} bars, poll every {}s)",
        symbol, config.market.interval, config.monitor.poll_interval_secs
    );

    let source = BinanceFuturesClient::new(
        &config.market.rest_url,
        &symbol,
        config.monitor.request_timeout(),
    )?;
    let bars = BinanceKlineWebSocket::new(&config.market.ws_url, &symbol, &config.market.interval);
    let alerts = AlertManager::new(config.alerts.manager_config(), &symbol);

    let orchestrator = SignalOrchestrator::new(
        config.monitor.orchestrator_config(),
        Arc::new(source),
        Arc::new(bars),
        Arc::new(alerts),
    );

    orchestrator.run(shutdown_signal()).await?;
    info!("failwatch stopped");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,failwatch={}", logging.level)));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

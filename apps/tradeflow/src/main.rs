//! Tradeflow Binary
//!
//! Starts the trade normalization relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tradeflow -- config.json
//! ```
//!
//! # Environment Variables
//!
//! - `TRADEFLOW_CONFIG`: config file path when no argument is given
//! - `BINANCE_API_KEY` / `BINANCE_API_SECRET`: Binance credentials
//! - `TRADEFLOW_CHANNEL_CAPACITY`: trade channel capacity (default: 1024)
//! - `TRADEFLOW_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: tradeflow)
//! - `RUST_LOG`: Log filter (default: tradeflow=info)

use std::path::PathBuf;

use anyhow::Context;
use tokio::signal;
use tradeflow::infrastructure::telemetry;
use tradeflow::{Pipeline, PipelineConfig, Registry, init_metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tradeflow");

    let path = config_path()?;
    let config = PipelineConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    log_config(&config);

    if config.metrics.port > 0 {
        init_metrics(config.metrics.port)?;
    }

    // Signal handlers must exist before the pipeline starts.
    let shutdown = shutdown_signal().context("installing signal handlers")?;

    let pipeline = Pipeline::start(&config, Registry::builtin()).await?;

    let signal = shutdown.await;
    tracing::info!(signal, "Shutdown signal received");

    if let Err(e) = pipeline.shutdown().await {
        tracing::error!(error = %e, "Shutdown finished with errors");
    }

    tracing::info!("Tradeflow stopped");
    Ok(())
}

/// Config path from the first argument, falling back to `TRADEFLOW_CONFIG`.
fn config_path() -> anyhow::Result<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("TRADEFLOW_CONFIG"))
        .map(PathBuf::from)
        .context("usage: tradeflow <config.json> (or set TRADEFLOW_CONFIG)")
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &PipelineConfig) {
    tracing::info!(
        exchanges = ?config.sources.enabled,
        symbols = ?config.sources.symbols,
        sinks = ?config.sinks.iter().map(|s| s.kind.as_str()).collect::<Vec<_>>(),
        channel_capacity = config.pipeline.channel_capacity,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );
    tracing::debug!(
        binance_endpoint = %config.binance.endpoint,
        binance_credentials = ?config.binance.credentials,
        coinbase_endpoint = %config.coinbase.endpoint,
        "Exchange endpoints"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Install handlers for SIGINT, SIGQUIT, SIGHUP and SIGTERM.
///
/// The returned future resolves with the name of the first signal received.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use signal::unix::{SignalKind, signal as unix_signal};

    let mut interrupt = unix_signal(SignalKind::interrupt())?;
    let mut quit = unix_signal(SignalKind::quit())?;
    let mut hangup = unix_signal(SignalKind::hangup())?;
    let mut terminate = unix_signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = quit.recv() => "SIGQUIT",
            _ = hangup.recv() => "SIGHUP",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-C handler failed, shutting down");
        }
        "ctrl-c"
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_handlers_install_and_wait() {
        let shutdown = shutdown_signal().unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), shutdown)
                .await
                .is_err()
        );
    }
}

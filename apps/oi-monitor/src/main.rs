//! OI Monitor Binary
//!
//! Runs collection and detection cycles on a fixed interval.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin oi-monitor
//! ```
//!
//! # Environment Variables
//!
//! - `OI_MONITOR_CONFIG`: config file path (default: config.yaml; built-in
//!   defaults when that file does not exist)
//! - `RUST_LOG`: log filter (default: the config's `observability.log_level`)
//!
//! The config file may reference further variables with `${VAR}` or
//! `${VAR:-default}`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use oi_monitor::config::{Config, DEFAULT_CONFIG_PATH, load_config};
use oi_monitor::fetcher::TokioSleeper;
use oi_monitor::observability::{init_metrics, init_tracing};
use oi_monitor::{
    AnomalyDetector, CollectionOrchestrator, Granularity, LogNotifier, MarketDataFetcher,
    SqliteStore, TimeSeriesStore, build_symbol_report, dispatch_unnotified,
};
use tokio::signal;

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "OI_MONITOR_CONFIG";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = read_config()?;
    init_tracing(&config.observability.log_level);

    tracing::info!(
        symbols = ?config.symbols,
        base_url = %config.exchange.base_url,
        db_path = %config.storage.db_path,
        interval_secs = config.schedule.update_interval_secs,
        "Starting OI monitor"
    );

    if let Some(addr) = &config.observability.metrics_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics address '{addr}'"))?;
        init_metrics(addr).context("failed to start metrics exporter")?;
        tracing::info!(%addr, "Metrics exporter listening");
    }

    let store: Arc<dyn TimeSeriesStore> = Arc::new(
        SqliteStore::open(&config.storage.db_path).context("failed to open time-series store")?,
    );
    let fetcher = MarketDataFetcher::new(&config.exchange, &config.fetch, Arc::new(TokioSleeper))
        .context("failed to create market data fetcher")?;
    let detector = AnomalyDetector::new(Arc::clone(&store), config.detection.clone());
    let orchestrator = CollectionOrchestrator::new(
        fetcher,
        Arc::clone(&store),
        detector,
        config.symbols.clone(),
        config.tracking.clone(),
    );

    run(&orchestrator, &config).await;

    tracing::info!("OI monitor stopped");
    Ok(())
}

/// Run cycles until shutdown, or once when `schedule.run_once` is set.
async fn run(orchestrator: &CollectionOrchestrator, config: &Config) {
    let notifier = LogNotifier;
    let mut ticker = tokio::time::interval(config.schedule.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Shutdown requested");
                return;
            }
            _ = ticker.tick() => {}
        }

        let report = tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Shutdown requested, abandoning cycle");
                return;
            }
            report = orchestrator.run_cycle() => report,
        };
        tracing::debug!(report = ?report, "Cycle report");

        dispatch_unnotified(orchestrator.store().as_ref(), &notifier).await;
        log_reports(orchestrator, config);

        if config.schedule.run_once {
            return;
        }
    }
}

/// Emit per-symbol reports at debug level.
fn log_reports(orchestrator: &CollectionOrchestrator, config: &Config) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    for granularity in Granularity::ALL {
        let points = config.detection.horizon(granularity).window;
        for symbol in orchestrator.symbols() {
            let report =
                build_symbol_report(orchestrator.store().as_ref(), symbol, granularity, points);
            match serde_json::to_string(&report) {
                Ok(json) => tracing::debug!(%symbol, granularity = granularity.as_str(), report = %json, "Symbol report"),
                Err(e) => tracing::warn!(%symbol, error = %e, "Failed to serialize report"),
            }
        }
    }
}

/// Load the config named by `OI_MONITOR_CONFIG`, else `config.yaml`, else defaults.
fn read_config() -> anyhow::Result<Config> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return load_config(Some(&path)).with_context(|| format!("failed to load config '{path}'"));
    }
    if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
        return load_config(None).context("failed to load config.yaml");
    }
    oi_monitor::config::load_config_from_string("").context("invalid built-in config")
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

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

/// Resolve on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed, that branch never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

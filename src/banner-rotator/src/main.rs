//! Banner Rotator: picks which banner to show in a slot with UCB1 and
//! exports show/click events to NATS.
//!
//! Main entry point that wires the store, engines, exporter and HTTP API.

use clap::Parser;
use rotator_api::ApiServer;
use rotator_core::config::AppConfig;
use rotator_core::{Clock, SystemClock};
use rotator_engine::{AssociationManager, SelectionEngine};
use rotator_statistics::{NatsBroker, StatisticsExporter};
use rotator_storage::MemoryStore;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "banner-rotator")]
#[command(about = "Multi-armed bandit banner rotation service")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "BANNER_ROTATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Node identifier (overrides config)
    #[arg(long, env = "BANNER_ROTATOR__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "BANNER_ROTATOR__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seconds between statistics exports (overrides config)
    #[arg(long, env = "BANNER_ROTATOR__STATISTICS__INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Don't export statistics to NATS (API-only mode)
    #[arg(long, default_value_t = false)]
    no_statistics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banner_rotator=info,rotator_engine=info,rotator_statistics=info,rotator_storage=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Banner Rotator starting up");

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(Some(path))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secs) = cli.interval_secs {
        config.statistics.interval_secs = secs;
    }
    if cli.no_statistics {
        config.statistics.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        statistics = config.statistics.enabled,
        interval_secs = config.statistics.interval_secs,
        window = ?config.statistics.window,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::from_catalog(&config.catalog, clock.clone()));

    let selection = Arc::new(SelectionEngine::new(store.clone()));
    let associations = Arc::new(AssociationManager::new(store.clone()));

    let shutdown = CancellationToken::new();

    let exporter_task = if config.statistics.enabled {
        match NatsBroker::connect(&config.nats).await {
            Ok(broker) => {
                let exporter = StatisticsExporter::new(
                    store.clone(),
                    Arc::new(broker),
                    clock.clone(),
                    config.statistics.interval(),
                    config.statistics.window,
                );
                Some(tokio::spawn(exporter.run(shutdown.clone())))
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to NATS, statistics export disabled");
                None
            }
        }
    } else {
        info!("Statistics export disabled");
        None
    };

    let api_server = ApiServer::new(config.clone(), selection, associations);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    info!("Banner Rotator is ready to serve traffic");

    let served = api_server.start_http(shutdown.clone()).await;
    shutdown.cancel();

    if let Some(task) = exporter_task {
        if let Err(e) = task.await {
            error!(error = %e, "Statistics exporter task failed");
        }
    }

    info!("Banner Rotator stopped");
    served
}

/// Cancel `shutdown` once `signal` fires. If the listener can't be
/// registered the service keeps running without Ctrl-C handling.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Can't listen for shutdown signal, Ctrl-C is disabled"),
    }
}

use pharos_swapper::chain::evm::EvmConnector;
use pharos_swapper::config::SwapperConfig;
use pharos_swapper::context::SwapperContext;
use pharos_swapper::worker::SwapWorkerFactory;

use anyhow::Result;
use clap::Parser;
use core_logic::config::parse_zone;
use core_logic::{setup_logger, MetricsCollector, WalletManager, WaveScheduler};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/pharos/config.toml")]
    config: String,
    #[arg(short, long)]
    export_metrics: Option<String>,
    #[arg(long, default_value = "30")]
    metrics_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let raw = SwapperConfig::load(&args.config)?;
    let display_zone = parse_zone(&raw.time_zone).unwrap_or(chrono_tz::Europe::Kyiv);
    let _log_guard = setup_logger(display_zone);
    info!("Loaded config from: {}", args.config);

    let settings = match raw.into_settings() {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Chain {} | {} router(s) | {} RPC endpoint(s) | concurrency {}",
        settings.chain_id,
        settings.routers.len(),
        settings.rpc_urls.len(),
        settings.wave.concurrency
    );

    let ctx = Arc::new(SwapperContext::from_settings(&settings));
    let connector = Arc::new(EvmConnector::new(settings.rpc_urls.clone(), settings.chain_id));
    let factory = Arc::new(SwapWorkerFactory::new(ctx, connector));
    let identities = Arc::new(WalletManager::new(&settings.key_file));
    let scheduler = WaveScheduler::new(settings.wave.clone(), identities, factory);

    let metrics_task = args.export_metrics.clone().map(|path| {
        let interval_secs = args.metrics_interval.max(1);
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                if let Err(e) = MetricsCollector::global().export_to_file(&path).await {
                    error!("Metrics export failed: {}", e);
                }
            }
        })
    });

    let result = scheduler.run_forever().await;

    if let Some(task) = metrics_task {
        task.abort();
    }
    if let Some(path) = &args.export_metrics {
        match MetricsCollector::global().export_to_file(path).await {
            Ok(()) => info!("Final metrics exported to {}", path),
            Err(e) => error!("Final metrics export failed: {}", e),
        }
    }

    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    result
}

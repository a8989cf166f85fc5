// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use rustls::crypto::{CryptoProvider, ring};

use listing_harvester::{
    collector::{CollectSettings, Collector},
    config::Config,
    cursor_store::CursorStore,
    fetcher::HttpPageFetcher,
    forwarder::{Forwarder, OccupancyFilter},
    metrics::RuntimeMetrics,
    proxy::ProxyPool,
    retry::RetryPolicy,
    scheduler::CycleScheduler,
    status::{self, StatusState},
};

use anyhow::Context;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize logging and the rustls crypto backend
// - Resolve configuration from the environment
// - Build proxy pool, fetcher, collector and forwarder
// - Run the cycle scheduler in the background
// - Serve the status endpoint in the foreground
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --------------------------------------------------------
    // IMPORTANT:
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation. This must be executed exactly once and
    // as early as possible in the process lifecycle.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .expect("failed to install rustls CryptoProvider");

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    info!(
        "[INIT] game={} max_pages={} skip={} concurrency={} interval={:?} filter=[{}, {}]",
        config.game_id,
        config.max_pages,
        config.skip_pages,
        config.concurrency,
        config.send_interval,
        config.min_players,
        config.max_players,
    );

    let metrics = Arc::new(RuntimeMetrics::default());

    // --------------------------------------------------------
    // Collection side
    // --------------------------------------------------------
    let proxies = ProxyPool::from_spec(&config.proxies_raw, config.request_timeout)?;
    let proxy_count = proxies.len();

    let fetcher = HttpPageFetcher::new(&config.listing_url, config.request_timeout, proxies)?;
    let collector = Collector::new(
        Arc::new(fetcher),
        CursorStore::with_capacity(config.cursor_cache_size),
        CollectSettings::from_config(&config, proxy_count),
        metrics.clone(),
    );

    // --------------------------------------------------------
    // Forwarding side
    // --------------------------------------------------------
    let forwarder = Forwarder::new(
        &config.main_api_url,
        config.forward_timeout,
        RetryPolicy::new(config.forward_attempts, config.retry_backoff),
    )?;
    let filter = OccupancyFilter::new(config.min_players, config.max_players, config.min_forward);

    let scheduler = CycleScheduler::new(
        collector,
        forwarder,
        filter,
        config.send_interval,
        metrics.clone(),
    );
    tokio::spawn(scheduler.run());

    // --------------------------------------------------------
    // Start metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    tokio::spawn({
        let metrics = metrics.clone();
        let every = config.metrics_interval.max(Duration::from_secs(1));
        async move {
            loop {
                sleep(every).await;
                info!("{}", metrics.log_line());
            }
        }
    });

    // --------------------------------------------------------
    // Status endpoint (foreground, keeps the process alive)
    // --------------------------------------------------------
    let state = StatusState {
        config: config.clone(),
        metrics,
        proxy_count,
    };
    status::serve(state, config.port).await
}

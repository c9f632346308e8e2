use analytics_monitor::config;
use analytics_monitor::dashboard::DashboardApi;
use analytics_monitor::fetch::CachedFetcher;
use analytics_monitor::monitor::MonitorService;
use analytics_monitor::reconcile::OrderReconciler;
use analytics_monitor::utils::setup_logging;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging()?;

    let config = config::load_config()?;
    info!(
        "Monitoring {} against remote snapshot {}",
        config.local_base_url, config.remote_snapshot_url
    );

    let fetcher = Arc::new(CachedFetcher::new(
        config.retry_policy(),
        Duration::from_secs(config.http_connect_timeout_secs),
    )?);

    let api = Arc::new(DashboardApi::from_config(fetcher.clone(), &config)?);
    let reconciler = Arc::new(OrderReconciler::new(
        fetcher,
        api.statistics_url().to_string(),
        config.remote_snapshot_url.clone(),
        config.remote_cache_ttl(),
    ));

    // The poll loops tick immediately on start, so the first reconciliation
    // and dashboard refresh need no separate eager pass here.
    let monitor = MonitorService::new(api, reconciler, &config);
    let handles = monitor.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping poll loops");
    monitor.shutdown();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Poll loop ended abnormally: {}", e);
        }
    }

    info!("Analytics monitor stopped");
    Ok(())
}

//! Live market data synchronization engine
//!
//! # Architecture
//! - **core**: Price types, instrument universe, id <-> symbol mapping
//! - **hot_path**: Ingest normalization and the shared price store
//! - **transport**: Stream/poll supervision with failover
//! - **exchanges / ws / rest**: Upstream clients
//! - **alerts**: Threshold rules evaluated against the store
//! - **infrastructure**: Cold path (logging, metrics, config, api)

use anyhow::Context;
use market_sync::alerts::{AlertMonitor, InMemoryAlertRepository, LogNotifier, Notifier, WebhookNotifier};
use market_sync::core::CatalogClient;
use market_sync::exchanges::BinanceStreamConnector;
use market_sync::infrastructure::{api, logging};
use market_sync::rest::{BinanceRestPoller, CoinGeckoSource};
use market_sync::{Config, EngineDeps, SyncEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    // Guards flush the file appenders on exit
    let _log_guards = logging::init_logging(&config.logging).context("initializing logging")?;
    tracing::info!("Starting market-sync...");

    let engine = Arc::new(SyncEngine::new(&config, build_deps(&config)));
    let (shutdown, shutdown_rx) = watch::channel(false);

    // Alert cadence loop
    let monitor = if config.alerts.enabled {
        let notifier: Arc<dyn Notifier> = match &config.alerts.webhook_url {
            Some(url) => Arc::new(
                WebhookNotifier::new(url, Duration::from_millis(config.alerts.webhook_timeout_ms))
                    .context("building webhook notifier")?,
            ),
            None => Arc::new(LogNotifier),
        };
        let repository = Arc::new(InMemoryAlertRepository::new(config.alert_rules()));
        tracing::info!("Alert monitor seeded with {} rules", config.alert_rules.len());

        let monitor = AlertMonitor::new(repository, notifier, engine.store(), engine.metrics())
            .with_interval(Duration::from_millis(config.alerts.interval_ms));
        Some(tokio::spawn(monitor.run(shutdown_rx)))
    } else {
        None
    };

    // API server (cold path)
    if config.api.enabled {
        let router = api::router(Arc::clone(&engine));
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(router, &host, port).await {
                tracing::error!("API Server failed: {}", e);
            }
        });
    }

    engine
        .start(config.engine.initial_page)
        .await
        .context("starting engine")?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("Shutdown requested");

    let _ = shutdown.send(true);
    if let Some(monitor) = monitor {
        let _ = monitor.await;
    }
    engine.stop().await;

    let metrics = engine.metrics().snapshot();
    tracing::info!(
        "Final stats: {} ticks received, {} accepted, {} failovers, {} alerts fired",
        metrics.ticks_received,
        metrics.ticks_accepted,
        metrics.failovers,
        metrics.alerts_fired
    );
    Ok(())
}

fn build_deps(config: &Config) -> EngineDeps {
    let request_timeout = config.request_timeout();
    let supervisor = &config.supervisor;

    let connector = BinanceStreamConnector::new(&config.feed.ws_url).with_timing(
        Duration::from_millis(supervisor.connect_timeout_ms),
        Duration::from_millis(supervisor.ping_interval_ms),
        Duration::from_millis(supervisor.stream_idle_timeout_ms),
    );
    let catalog = CatalogClient::new(
        &config.feed.rest_url,
        Duration::from_millis(config.mapper.fetch_timeout_ms),
    );

    EngineDeps {
        catalog: Arc::new(catalog),
        connector: Arc::new(connector),
        poller: Arc::new(BinanceRestPoller::new(&config.feed.rest_url, request_timeout)),
        secondary: Arc::new(CoinGeckoSource::new(&config.feed.secondary_url, request_timeout)),
    }
}

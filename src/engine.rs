//! Synchronization engine
//!
//! Composition root: resolves the current page through the mapper, hands
//! the resulting plan to the transport supervisor and exposes the shared
//! store, health signal and status to consumers (API, alert monitor).

use crate::core::{InstrumentMapper, InstrumentUniverse, Resolution};
use crate::exchanges::traits::{CatalogSource, SecondarySource, StreamConnector, TickerPoller};
use crate::hot_path::PriceStore;
use crate::infrastructure::config::Config;
use crate::infrastructure::metrics::MetricsCollector;
use crate::transport::{
    ConnectionState, Phase, SessionPlan, TransportDeps, TransportKind, TransportSupervisor,
};
use crate::{Result, SyncError};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};

/// Upstream collaborators
#[derive(Clone)]
pub struct EngineDeps {
    pub catalog: Arc<dyn CatalogSource>,
    pub connector: Arc<dyn StreamConnector>,
    pub poller: Arc<dyn TickerPoller>,
    pub secondary: Arc<dyn SecondarySource>,
}

/// Status surface for the UI boundary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub phase: Phase,
    pub transport: TransportKind,
    pub attempt: u32,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update_at: Option<OffsetDateTime>,
    pub page: usize,
    pub page_count: usize,
    pub mapped_count: usize,
    pub unmapped_count: usize,
    pub coverage: f64,
}

#[derive(Default)]
struct PageState {
    page: usize,
    resolution: Option<Resolution>,
}

/// Page view published at the end of each activation
#[derive(Debug, Clone, Copy, Default)]
struct PageSummary {
    page: usize,
    mapped_count: usize,
    unmapped_count: usize,
    coverage: f64,
}

pub struct SyncEngine {
    universe: Arc<InstrumentUniverse>,
    page_size: usize,
    store: Arc<PriceStore>,
    mapper: InstrumentMapper,
    supervisor: TransportSupervisor,
    metrics: Arc<MetricsCollector>,
    /// Serializes resolve + start sequences
    current: Mutex<PageState>,
    /// Read by `status` without waiting on a lifecycle call
    summary: RwLock<PageSummary>,
}

impl SyncEngine {
    pub fn new(config: &Config, deps: EngineDeps) -> Self {
        let universe = Arc::new(config.universe());
        let store = Arc::new(PriceStore::with_ordering(universe.ordering()));
        let metrics = Arc::new(MetricsCollector::new());

        let mapper = InstrumentMapper::new(deps.catalog, &universe).with_timing(
            Duration::from_secs(config.mapper.catalog_ttl_secs),
            Duration::from_millis(config.mapper.fetch_timeout_ms),
        );
        let supervisor = TransportSupervisor::new(
            config.supervisor_settings(),
            TransportDeps {
                connector: deps.connector,
                poller: deps.poller,
                secondary: deps.secondary,
            },
            Arc::clone(&store),
            Arc::clone(&universe),
            Arc::clone(&metrics),
        );

        Self {
            universe,
            page_size: config.engine.page_size,
            store,
            mapper,
            supervisor,
            metrics,
            current: Mutex::new(PageState {
                page: config.engine.initial_page,
                resolution: None,
            }),
            summary: RwLock::new(PageSummary {
                page: config.engine.initial_page,
                ..PageSummary::default()
            }),
        }
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.universe.page_count(self.page_size)
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn universe(&self) -> &Arc<InstrumentUniverse> {
        &self.universe
    }

    pub fn store(&self) -> Arc<PriceStore> {
        Arc::clone(&self.store)
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Woken on every connection state transition
    pub fn health(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.subscribe_health()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Resolve `page` and start its transport
    pub async fn start(&self, page: usize) -> Result<()> {
        let mut current = self.current.lock().await;
        self.activate(&mut current, page).await
    }

    /// Tear down the current page's transport, then serve `page`. Records
    /// from the previous page stay readable.
    pub async fn switch_page(&self, page: usize) -> Result<()> {
        let mut current = self.current.lock().await;
        if current.resolution.is_some() && current.page == page {
            tracing::debug!(target: "engine", "Page {} already active", page);
            return Ok(());
        }
        self.activate(&mut current, page).await
    }

    pub async fn stop(&self) {
        let _current = self.current.lock().await;
        self.supervisor.stop().await;
        tracing::info!(target: "engine", "Engine stopped");
    }

    /// Restart the current page's transport after the reconnect delay.
    /// Returns `false` when nothing was ever started.
    pub async fn reconnect(&self) -> bool {
        let _current = self.current.lock().await;
        self.supervisor.reconnect().await
    }

    /// Stop, drop every record and the cached catalog, then serve the
    /// current page again from scratch
    pub async fn reset(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        self.supervisor.stop().await;
        self.store.reset();
        self.mapper.invalidate_catalog().await;
        tracing::info!(target: "engine", "Engine reset");

        let page = current.page;
        self.activate(&mut current, page).await
    }

    /// Never waits on a page switch, reset or reconnect in progress
    pub async fn status(&self) -> EngineStatus {
        let summary = *self.summary.read();
        let state = self.supervisor.state();

        EngineStatus {
            phase: state.phase,
            transport: state.transport,
            attempt: state.attempt,
            last_error: state.last_error,
            last_update_at: state.last_update_at,
            page: summary.page,
            page_count: self.page_count(),
            mapped_count: summary.mapped_count,
            unmapped_count: summary.unmapped_count,
            coverage: summary.coverage,
        }
    }

    async fn activate(&self, current: &mut PageState, page: usize) -> Result<()> {
        let page_count = self.page_count();
        if page >= page_count {
            return Err(SyncError::InvalidPage { page, page_count });
        }

        let ids: Vec<_> = self
            .universe
            .page(page, self.page_size)
            .iter()
            .map(|spec| spec.id.clone())
            .collect();
        let resolution = self.mapper.resolve(&ids).await;

        tracing::info!(
            target: "engine",
            "Page {}/{}: {} mapped, {} unmapped (coverage {:.2})",
            page,
            page_count,
            resolution.mapped.len(),
            resolution.unmapped.len(),
            resolution.coverage
        );

        self.supervisor
            .switch_page(SessionPlan {
                page,
                resolution: resolution.clone(),
            })
            .await;
        *self.summary.write() = PageSummary {
            page,
            mapped_count: resolution.mapped.len(),
            unmapped_count: resolution.unmapped.len(),
            coverage: resolution.coverage,
        };
        current.page = page;
        current.resolution = Some(resolution);
        Ok(())
    }
}

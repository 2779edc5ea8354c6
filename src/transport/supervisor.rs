//! Transport supervisor
//!
//! Owns the one live transport for the current page. A session starts on
//! the stream, retries abnormal closes with capped exponential backoff and,
//! once the attempt ceiling is hit, fails over to REST polling. While
//! polling it periodically probes the stream and switches back as soon as a
//! probe produces a tick.
//!
//! Lifecycle calls (`start`, `stop`, `switch_page`, `reconnect`) are
//! serialized by one mutex; each session watches a shutdown flag in every
//! wait and is aborted if it overstays the grace period.

use crate::core::{FeedSymbol, InstrumentUniverse, PriceSource, RawTicker, Resolution};
use crate::exchanges::traits::{
    CloseKind, SecondarySource, StreamConnector, StreamEvent, TickStream, TickerPoller,
};
use crate::hot_path::{IngestOutcome, Normalizer, PriceStore};
use crate::infrastructure::metrics::MetricsCollector;
use crate::transport::polling::{fetch_all, fetch_secondary};
use crate::transport::state::{backoff, ConnectionState, Phase, StateCell, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, sleep, timeout, Instant, MissedTickBehavior};

/// Timing and retry policy
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub max_stream_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Bound on connect plus first tick
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub secondary_interval: Duration,
    pub secondary_currency: String,
    /// Zero disables probing while polling
    pub stream_probe_interval: Duration,
    pub reconnect_delay: Duration,
    pub stop_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_stream_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(30_000),
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(5),
            secondary_interval: Duration::from_secs(15),
            secondary_currency: "usd".to_string(),
            stream_probe_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(1),
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// What one session serves
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub page: usize,
    pub resolution: Resolution,
}

/// Upstream collaborators of a supervisor
#[derive(Clone)]
pub struct TransportDeps {
    pub connector: Arc<dyn StreamConnector>,
    pub poller: Arc<dyn TickerPoller>,
    pub secondary: Arc<dyn SecondarySource>,
}

struct Shared {
    settings: SupervisorSettings,
    deps: TransportDeps,
    store: Arc<PriceStore>,
    universe: Arc<InstrumentUniverse>,
    metrics: Arc<MetricsCollector>,
    state: StateCell,
}

struct SessionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    session: Option<SessionHandle>,
    last_plan: Option<SessionPlan>,
}

pub struct TransportSupervisor {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl TransportSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        deps: TransportDeps,
        store: Arc<PriceStore>,
        universe: Arc<InstrumentUniverse>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                deps,
                store,
                universe,
                metrics,
                state: StateCell::new(),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.snapshot()
    }

    /// Health signal: a receiver woken on every state transition
    pub fn subscribe_health(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Open a session for `plan`. A running session is torn down first.
    pub async fn start(&self, plan: SessionPlan) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown(&mut lifecycle).await;
        self.launch(&mut lifecycle, plan);
    }

    /// Tear down the current session. No-op when nothing runs.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown(&mut lifecycle).await;
    }

    /// Old transport is fully gone before the new one opens
    pub async fn switch_page(&self, plan: SessionPlan) {
        self.start(plan).await;
    }

    /// Stop, wait the reconnect delay, start the last plan again. Returns
    /// `false` when no plan was ever started.
    pub async fn reconnect(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown(&mut lifecycle).await;

        let Some(plan) = lifecycle.last_plan.clone() else {
            return false;
        };
        sleep(self.shared.settings.reconnect_delay).await;
        crate::log_transport!(tracing::Level::INFO, "Manual reconnect for page {}", plan.page);
        self.launch(&mut lifecycle, plan);
        true
    }

    pub async fn current_plan(&self) -> Option<SessionPlan> {
        self.lifecycle.lock().await.last_plan.clone()
    }

    fn launch(&self, lifecycle: &mut Lifecycle, plan: SessionPlan) {
        let symbols = plan.resolution.feed_symbols();
        let initial = if symbols.is_empty() {
            TransportKind::Polling
        } else {
            TransportKind::Streaming
        };
        self.shared.state.connecting(initial, 0);

        crate::log_transport!(
            tracing::Level::INFO,
            "Starting session for page {}: {} streamed, {} via secondary",
            plan.page,
            symbols.len(),
            plan.resolution.unmapped.len()
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let session = Arc::new(Session {
            shared: Arc::clone(&self.shared),
            normalizer: Normalizer::new(Arc::clone(&self.shared.universe), &plan.resolution),
            symbols,
            shutdown: shutdown_rx,
        });

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = Arc::clone(&session).run_primary() => {}
                _ = session.run_secondary() => {}
            }
        });

        lifecycle.session = Some(SessionHandle { shutdown, task });
        lifecycle.last_plan = Some(plan);
    }

    async fn teardown(&self, lifecycle: &mut Lifecycle) {
        let Some(session) = lifecycle.session.take() else {
            return;
        };

        let _ = session.shutdown.send(true);
        let mut task = session.task;
        if timeout(self.shared.settings.stop_grace, &mut task).await.is_err() {
            crate::log_transport!(tracing::Level::WARN, "Session ignored shutdown, aborting");
            task.abort();
            let _ = task.await;
        }

        self.shared.state.stopped();
        crate::log_transport!(tracing::Level::INFO, "Session stopped");
    }
}

impl Drop for TransportSupervisor {
    fn drop(&mut self) {
        if let Some(session) = self.lifecycle.get_mut().session.take() {
            session.task.abort();
        }
    }
}

enum OpenOutcome {
    Opened(Box<dyn TickStream>, RawTicker),
    Failed(String),
    Clean,
    Shutdown,
}

enum StreamEnd {
    Shutdown,
    Clean,
    Abnormal(String),
}

enum PollEnd {
    Shutdown,
    Restored(Box<dyn TickStream>, RawTicker),
}

/// Resolves once the session's shutdown flag is raised (or its sender is gone)
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct Session {
    shared: Arc<Shared>,
    normalizer: Normalizer,
    symbols: Vec<FeedSymbol>,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    fn is_current(&self) -> bool {
        !*self.shutdown.borrow()
    }

    fn ingest(&self, ticker: &RawTicker, source: PriceSource) -> IngestOutcome {
        let outcome = self.normalizer.ingest_ticker(&self.shared.store, ticker, source);
        self.shared.metrics.record_ingest(outcome);
        self.shared.state.on_tick(outcome.is_fresh());
        outcome
    }

    async fn run_primary(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        let settings = &self.shared.settings;
        let state = &self.shared.state;

        if self.symbols.is_empty() {
            crate::log_transport!(tracing::Level::INFO, "No mapped symbols, polling secondary only");
            state.polling();
        } else {
            let mut attempt: u32 = 0;
            loop {
                state.connecting(TransportKind::Streaming, attempt);

                let failure = match self.open_stream(&mut shutdown).await {
                    OpenOutcome::Opened(stream, first) => {
                        attempt = 0;
                        match self.stream(stream, first, &mut shutdown).await {
                            StreamEnd::Shutdown => return,
                            StreamEnd::Clean => return self.closed_clean(),
                            StreamEnd::Abnormal(reason) => reason,
                        }
                    }
                    OpenOutcome::Failed(reason) => reason,
                    OpenOutcome::Clean => return self.closed_clean(),
                    OpenOutcome::Shutdown => return,
                };

                self.shared.metrics.record_stream_failure();
                state.failed(failure.clone());

                if attempt >= settings.max_stream_attempts {
                    crate::log_transport!(
                        tracing::Level::WARN,
                        "Stream failed {} times (last: {}), falling back to polling",
                        attempt + 1,
                        failure
                    );
                    break;
                }

                let delay = backoff(attempt, settings.backoff_base, settings.backoff_cap);
                crate::log_transport!(
                    tracing::Level::WARN,
                    "Stream failed ({}), retry {} in {:?}",
                    failure,
                    attempt + 1,
                    delay
                );
                tokio::select! {
                    _ = cancelled(&mut shutdown) => return,
                    _ = sleep(delay) => {}
                }
                attempt += 1;
            }

            self.shared.metrics.record_failover();
            state.connecting(TransportKind::Polling, attempt);
            state.polling();
        }

        // Polling, with a path back to streaming via probes
        loop {
            match self.poll(&mut shutdown).await {
                PollEnd::Shutdown => return,
                PollEnd::Restored(stream, first) => {
                    self.shared.metrics.record_stream_restored();
                    crate::log_transport!(tracing::Level::INFO, "Stream probe succeeded, leaving polling");
                    match self.stream(stream, first, &mut shutdown).await {
                        StreamEnd::Shutdown => return,
                        StreamEnd::Clean => return self.closed_clean(),
                        StreamEnd::Abnormal(reason) => {
                            self.shared.metrics.record_stream_failure();
                            state.failed(reason.clone());
                            crate::log_transport!(
                                tracing::Level::WARN,
                                "Restored stream dropped ({}), back to polling",
                                reason
                            );
                            state.polling();
                        }
                    }
                }
            }
        }
    }

    fn closed_clean(&self) {
        crate::log_transport!(tracing::Level::INFO, "Upstream closed the stream cleanly");
        self.shared.state.stopped();
    }

    /// Connect and wait for the first tick, all under `connect_timeout`
    async fn open_stream(&self, shutdown: &mut watch::Receiver<bool>) -> OpenOutcome {
        let connect = async {
            let mut stream = match self.shared.deps.connector.connect(&self.symbols).await {
                Ok(stream) => stream,
                Err(e) => return Err(Some(e.to_string())),
            };
            self.shared.metrics.record_stream_connect();

            loop {
                match stream.next_event().await {
                    StreamEvent::Tick(ticker) => return Ok((stream, ticker)),
                    StreamEvent::Malformed(raw) => {
                        self.shared.metrics.record_malformed();
                        tracing::debug!(target: "transport", "Malformed frame: {}", raw);
                    }
                    StreamEvent::Ignored => {}
                    StreamEvent::Closed(CloseKind::Clean) => return Err(None),
                    StreamEvent::Closed(CloseKind::Abnormal(reason)) => return Err(Some(reason)),
                }
            }
        };

        tokio::select! {
            _ = cancelled(shutdown) => OpenOutcome::Shutdown,
            result = timeout(self.shared.settings.connect_timeout, connect) => match result {
                Ok(Ok((stream, first))) => OpenOutcome::Opened(stream, first),
                Ok(Err(Some(reason))) => OpenOutcome::Failed(reason),
                Ok(Err(None)) => OpenOutcome::Clean,
                Err(_) => OpenOutcome::Failed(format!(
                    "no tick within {:?} of connecting",
                    self.shared.settings.connect_timeout
                )),
            },
        }
    }

    async fn stream(
        &self,
        mut stream: Box<dyn TickStream>,
        first: RawTicker,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        self.shared.state.streaming();
        crate::log_transport!(tracing::Level::INFO, "Streaming {} symbols", self.symbols.len());
        self.ingest(&first, PriceSource::Stream);

        loop {
            tokio::select! {
                _ = cancelled(shutdown) => {
                    stream.close().await;
                    return StreamEnd::Shutdown;
                }
                event = stream.next_event() => match event {
                    StreamEvent::Tick(ticker) => {
                        self.ingest(&ticker, PriceSource::Stream);
                    }
                    StreamEvent::Malformed(raw) => {
                        self.shared.metrics.record_malformed();
                        tracing::debug!(target: "transport", "Malformed frame: {}", raw);
                    }
                    StreamEvent::Ignored => {}
                    StreamEvent::Closed(CloseKind::Clean) => return StreamEnd::Clean,
                    StreamEvent::Closed(CloseKind::Abnormal(reason)) => return StreamEnd::Abnormal(reason),
                },
            }
        }
    }

    async fn poll(self: &Arc<Self>, shutdown: &mut watch::Receiver<bool>) -> PollEnd {
        let settings = &self.shared.settings;

        let mut cadence = interval(settings.poll_interval);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let probing = !settings.stream_probe_interval.is_zero() && !self.symbols.is_empty();
        let probe_period = if probing {
            settings.stream_probe_interval
        } else {
            Duration::from_secs(3600)
        };
        let mut probe_timer = interval_at(Instant::now() + probe_period, probe_period);
        probe_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycles = JoinSet::new();
        let mut probes: JoinSet<Option<(Box<dyn TickStream>, RawTicker)>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancelled(shutdown) => return PollEnd::Shutdown,
                _ = cadence.tick() => {
                    if !self.symbols.is_empty() {
                        cycles.spawn(Arc::clone(self).poll_cycle());
                    }
                }
                Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
                _ = probe_timer.tick(), if probing && probes.is_empty() => {
                    let session = Arc::clone(self);
                    probes.spawn(async move {
                        let mut shutdown = session.shutdown.clone();
                        match session.open_stream(&mut shutdown).await {
                            OpenOutcome::Opened(stream, first) => Some((stream, first)),
                            _ => None,
                        }
                    });
                }
                Some(result) = probes.join_next(), if !probes.is_empty() => {
                    if let Ok(Some((stream, first))) = result {
                        cycles.abort_all();
                        return PollEnd::Restored(stream, first);
                    }
                    tracing::debug!(target: "transport", "Stream probe failed, staying on polling");
                }
            }
        }
    }

    async fn poll_cycle(self: Arc<Self>) {
        let settings = &self.shared.settings;
        let batch = fetch_all(&*self.shared.deps.poller, &self.symbols, settings.request_timeout).await;

        // Results landing after a restore or teardown are dropped
        if !self.is_current() || self.shared.state.snapshot().phase != Phase::Polling {
            return;
        }

        for ticker in &batch.tickers {
            self.ingest(ticker, PriceSource::PolledPrimary);
        }
        self.shared.metrics.record_poll_cycle(batch.successes());

        if batch.successes() == 0 {
            let summary = batch.failure_summary();
            crate::log_transport!(tracing::Level::WARN, "{}", summary);
            self.shared.state.failed(summary);
        }
    }

    /// Runs for the whole session; never returns on its own
    async fn run_secondary(&self) {
        let ids = self.normalizer.secondary_ids();
        if ids.is_empty() {
            return std::future::pending().await;
        }

        let settings = &self.shared.settings;
        let mut cadence = interval(settings.secondary_interval);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            cadence.tick().await;
            let result = fetch_secondary(
                &*self.shared.deps.secondary,
                ids,
                &settings.secondary_currency,
                settings.request_timeout,
            )
            .await;

            match result {
                Ok(quotes) => {
                    self.shared.metrics.record_secondary_fetch();
                    let mut fresh = false;
                    for quote in &quotes {
                        let outcome = self.normalizer.ingest_secondary(&self.shared.store, quote);
                        self.shared.metrics.record_ingest(outcome);
                        fresh |= outcome.is_fresh();
                    }
                    if fresh {
                        self.shared.state.touched();
                    }
                }
                Err(err) => {
                    crate::log_transport!(
                        tracing::Level::WARN,
                        "Secondary fetch for {} ids failed: {}",
                        ids.len(),
                        err
                    );
                }
            }
        }
    }
}

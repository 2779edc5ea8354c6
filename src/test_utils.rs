//! Test fixtures and scripted fakes for every collaborator trait

use crate::alerts::{AlertRepository, AlertRule, Notifier, TriggerEvent};
use crate::core::{
    DiscoveryError, FeedSymbol, FixedPoint8, InstrumentId, PriceRecord, PriceSource, RawTicker, SecondaryQuote,
};
use crate::exchanges::traits::{
    CatalogSource, SecondarySource, StreamConnector, StreamEvent, TickStream, TickerPoller, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Whole-unit price
pub fn price(units: i64) -> FixedPoint8 {
    FixedPoint8::from_int(units).unwrap()
}

/// Valid record: high above and low below `units`
pub fn record(id: &str, units: i64) -> PriceRecord {
    let p = price(units);
    PriceRecord {
        id: InstrumentId::new(id),
        display_symbol: id.to_uppercase(),
        display_name: id.to_string(),
        price: p,
        change_24h_pct: FixedPoint8::from_raw(150_000_000),
        high_24h: FixedPoint8::from_raw(p.as_raw() + FixedPoint8::SCALE),
        low_24h: FixedPoint8::from_raw(p.as_raw() / 2),
        volume_24h: price(1000),
        observed_at: OffsetDateTime::now_utc(),
        source: PriceSource::Stream,
    }
}

pub fn ticker(symbol: &str, units: i64) -> RawTicker {
    let p = price(units);
    RawTicker {
        symbol: FeedSymbol::new(symbol),
        last_price: p,
        change_pct: FixedPoint8::from_raw(-50_000_000),
        high: FixedPoint8::from_raw(p.as_raw() + FixedPoint8::SCALE),
        low: FixedPoint8::from_raw(p.as_raw() / 2),
        volume: price(10),
    }
}

// ---------------------------------------------------------------------------
// Catalog

pub struct StaticCatalog {
    symbols: Mutex<Vec<FeedSymbol>>,
    failing: AtomicBool,
    hanging: AtomicBool,
    fetches: AtomicUsize,
}

impl StaticCatalog {
    pub fn new(symbols: &[&str]) -> Self {
        Self {
            symbols: Mutex::new(symbols.iter().map(FeedSymbol::new).collect()),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_symbols(&self, symbols: &[&str]) {
        *self.symbols.lock() = symbols.iter().map(FeedSymbol::new).collect();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch_catalog(&self) -> Result<Vec<FeedSymbol>, DiscoveryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Network("catalog unreachable".into()));
        }
        Ok(self.symbols.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Stream

/// What the next `connect` does
pub enum Script {
    Fail(TransportError),
    /// Connect never completes
    Hang,
    /// Yields these events, then goes silent
    Events(Vec<StreamEvent>),
    /// Yields whatever the test sends
    Channel(mpsc::UnboundedReceiver<StreamEvent>),
}

impl Script {
    pub fn channel() -> (mpsc::UnboundedSender<StreamEvent>, Script) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Script::Channel(rx))
    }
}

#[derive(Default)]
struct StreamStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicUsize,
}

/// Replays queued scripts; falls back to failing or hanging when empty
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    hang_when_empty: bool,
    stats: Arc<StreamStats>,
}

impl ScriptedConnector {
    pub fn failing() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            hang_when_empty: false,
            stats: Arc::default(),
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang_when_empty: true,
            ..Self::failing()
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    pub fn connects(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.stats.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, _symbols: &[FeedSymbol]) -> Result<Box<dyn TickStream>, TransportError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().pop_front();
        let script = match script {
            Some(script) => script,
            None if self.hang_when_empty => Script::Hang,
            None => Script::Fail(TransportError::Connect("connection refused".into())),
        };

        let source = match script {
            Script::Fail(e) => return Err(e),
            Script::Hang => return std::future::pending().await,
            Script::Events(events) => EventSource::Queue(events.into()),
            Script::Channel(rx) => EventSource::Channel(rx),
        };
        self.stats.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            source,
            stats: Arc::clone(&self.stats),
        }))
    }
}

enum EventSource {
    Queue(VecDeque<StreamEvent>),
    Channel(mpsc::UnboundedReceiver<StreamEvent>),
}

struct ScriptedStream {
    source: EventSource,
    stats: Arc<StreamStats>,
}

#[async_trait]
impl TickStream for ScriptedStream {
    async fn next_event(&mut self) -> StreamEvent {
        let next = match &mut self.source {
            EventSource::Queue(events) => events.pop_front(),
            EventSource::Channel(rx) => rx.recv().await,
        };
        match next {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// REST

/// Serves fixed tickers; unknown symbols get 404, hung symbols never answer
pub struct MapPoller {
    tickers: Mutex<HashMap<FeedSymbol, RawTicker>>,
    hanging: Mutex<HashSet<FeedSymbol>>,
    requests: AtomicUsize,
}

impl MapPoller {
    pub fn new(tickers: &[RawTicker]) -> Self {
        Self {
            tickers: Mutex::new(tickers.iter().map(|t| (t.symbol.clone(), t.clone())).collect()),
            hanging: Mutex::new(HashSet::new()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, ticker: RawTicker) {
        self.tickers.lock().insert(ticker.symbol.clone(), ticker);
    }

    pub fn hang(&self, symbol: &str) {
        self.hanging.lock().insert(FeedSymbol::new(symbol));
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TickerPoller for MapPoller {
    async fn fetch_ticker(&self, symbol: &FeedSymbol) -> Result<RawTicker, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.hanging.lock().contains(symbol) {
            return std::future::pending().await;
        }
        let found = self.tickers.lock().get(symbol).cloned();
        found.ok_or(TransportError::Http(404))
    }
}

pub struct FixedSecondary {
    quotes: Mutex<Vec<SecondaryQuote>>,
    last_currency: Mutex<Option<String>>,
    failing: AtomicBool,
}

impl FixedSecondary {
    pub fn new(quotes: &[(&str, i64)]) -> Self {
        Self {
            quotes: Mutex::new(
                quotes
                    .iter()
                    .map(|(id, units)| SecondaryQuote {
                        id: InstrumentId::new(*id),
                        price: price(*units),
                        change_24h_pct: None,
                        volume_24h: None,
                    })
                    .collect(),
            ),
            last_currency: Mutex::new(None),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_currency(&self) -> Option<String> {
        self.last_currency.lock().clone()
    }
}

#[async_trait]
impl SecondarySource for FixedSecondary {
    async fn fetch_prices(
        &self,
        ids: &[InstrumentId],
        currency: &str,
    ) -> Result<Vec<SecondaryQuote>, TransportError> {
        *self.last_currency.lock() = Some(currency.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Network("secondary down".into()));
        }
        Ok(self
            .quotes
            .lock()
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Alerts

/// Records every delivery; optionally fails them all
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, TriggerEvent)>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, TriggerEvent)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, event: &TriggerEvent) -> anyhow::Result<()> {
        if self.hanging.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("smtp relay down");
        }
        self.sent.lock().push((recipient.to_string(), event.clone()));
        Ok(())
    }
}

/// Always lists the same rules and refuses to record triggers
pub struct StubRepository {
    rules: Vec<AlertRule>,
}

impl StubRepository {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl AlertRepository for StubRepository {
    async fn list_active_rules(&self) -> anyhow::Result<Vec<AlertRule>> {
        Ok(self.rules.clone())
    }

    async fn mark_triggered(&self, _event: &TriggerEvent) -> anyhow::Result<()> {
        anyhow::bail!("rule store read-only")
    }
}

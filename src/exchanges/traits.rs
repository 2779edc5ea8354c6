//! Upstream collaborator traits
//!
//! The supervisor and mapper only talk to the feed through these seams, so
//! tests can drive every transition with scripted fakes. Trait objects are
//! fine here: none of these sit on a per-byte path.

use crate::core::{DiscoveryError, FeedSymbol, InstrumentId, RawTicker, SecondaryQuote};
use async_trait::async_trait;

/// Transport-level failures. Recovered by the supervisor, surfaced only
/// through `ConnectionState::last_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Http(u16),
    #[error("rate limited")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("connection closed: {0}")]
    Closed(String),
}

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// Close code 1000/1001; no retry
    Clean,
    /// Anything else, including socket errors and idle timeouts
    Abnormal(String),
}

/// One step of a live stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Tick(RawTicker),
    /// Ticker frame that failed strict parsing
    Malformed(String),
    /// Acks, pongs and other frames with no price content
    Ignored,
    Closed(CloseKind),
}

/// Tradable symbol catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Vec<FeedSymbol>, DiscoveryError>;
}

/// Opens streaming subscriptions
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Connect and subscribe; the returned stream yields ticks for `symbols`
    async fn connect(&self, symbols: &[FeedSymbol]) -> Result<Box<dyn TickStream>, TransportError>;
}

/// An open streaming subscription
#[async_trait]
pub trait TickStream: Send {
    /// Next event; after `Closed` the stream must not be polled again
    async fn next_event(&mut self) -> StreamEvent;

    /// Best-effort graceful close
    async fn close(&mut self);
}

/// Per-symbol REST ticker endpoint
#[async_trait]
pub trait TickerPoller: Send + Sync {
    async fn fetch_ticker(&self, symbol: &FeedSymbol) -> Result<RawTicker, TransportError>;
}

/// Secondary price source for ids the primary feed cannot serve
#[async_trait]
pub trait SecondarySource: Send + Sync {
    /// Quotes in `currency`; ids the source does not know are simply absent
    async fn fetch_prices(
        &self,
        ids: &[InstrumentId],
        currency: &str,
    ) -> Result<Vec<SecondaryQuote>, TransportError>;
}

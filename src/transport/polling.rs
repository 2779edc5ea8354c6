//! REST fan-out for one poll cycle
//!
//! Each symbol is requested concurrently under its own timeout, so one hung
//! request costs at most `request_timeout` and never fails the others.

use crate::core::{FeedSymbol, InstrumentId, RawTicker, SecondaryQuote};
use crate::exchanges::traits::{SecondarySource, TickerPoller, TransportError};
use futures_util::future::join_all;
use std::time::Duration;
use tokio::time::timeout;

/// Results of one cycle, split by outcome
#[derive(Debug, Default)]
pub struct PollBatch {
    pub tickers: Vec<RawTicker>,
    pub failures: Vec<(FeedSymbol, TransportError)>,
}

impl PollBatch {
    pub fn successes(&self) -> usize {
        self.tickers.len()
    }

    /// Summary for `last_error` when nothing succeeded
    pub fn failure_summary(&self) -> String {
        match self.failures.first() {
            Some((symbol, err)) => format!(
                "poll cycle failed for all {} symbols (first: {} {})",
                self.failures.len(),
                symbol,
                err
            ),
            None => "poll cycle returned nothing".to_string(),
        }
    }
}

pub async fn fetch_all(
    poller: &dyn TickerPoller,
    symbols: &[FeedSymbol],
    request_timeout: Duration,
) -> PollBatch {
    let requests = symbols.iter().map(|symbol| async move {
        let result = match timeout(request_timeout, poller.fetch_ticker(symbol)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        (symbol, result)
    });

    let mut batch = PollBatch::default();
    for (symbol, result) in join_all(requests).await {
        match result {
            Ok(ticker) => batch.tickers.push(ticker),
            Err(err) => {
                tracing::debug!(target: "transport", "Poll {} failed: {}", symbol, err);
                batch.failures.push((symbol.clone(), err));
            }
        }
    }
    batch
}

/// One secondary request for all `ids`
pub async fn fetch_secondary(
    source: &dyn SecondarySource,
    ids: &[InstrumentId],
    currency: &str,
    request_timeout: Duration,
) -> Result<Vec<SecondaryQuote>, TransportError> {
    match timeout(request_timeout, source.fetch_prices(ids, currency)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

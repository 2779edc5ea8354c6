//! Ingest normalization
//!
//! Turns raw ticks into `PriceRecord`s: the feed symbol goes back to a
//! canonical id through the session's reverse index, display fields come
//! from the instrument universe.

use crate::core::{
    FeedSymbol, FixedPoint8, InstrumentId, InstrumentUniverse, PriceRecord, PriceSource, RawTicker,
    RecordRejection, Resolution, SecondaryQuote,
};
use crate::hot_path::store::{PriceStore, UpsertOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// What happened to one upstream update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Unchanged,
    Rejected(RecordRejection),
    /// Symbol (or secondary id) not part of the current session
    Unmapped,
}

impl From<UpsertOutcome> for IngestOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Accepted => IngestOutcome::Accepted,
            UpsertOutcome::Unchanged => IngestOutcome::Unchanged,
            UpsertOutcome::Rejected(r) => IngestOutcome::Rejected(r),
        }
    }
}

impl IngestOutcome {
    /// Accepted and unchanged both count as a successful update
    #[inline]
    pub fn is_fresh(&self) -> bool {
        matches!(self, IngestOutcome::Accepted | IngestOutcome::Unchanged)
    }
}

/// Per-session normalizer
pub struct Normalizer {
    universe: Arc<InstrumentUniverse>,
    index: HashMap<FeedSymbol, InstrumentId>,
    secondary: Vec<InstrumentId>,
}

impl Normalizer {
    pub fn new(universe: Arc<InstrumentUniverse>, resolution: &Resolution) -> Self {
        Self {
            universe,
            index: resolution.reverse_index(),
            secondary: resolution.unmapped.clone(),
        }
    }

    pub fn resolve(&self, symbol: &FeedSymbol) -> Option<&InstrumentId> {
        self.index.get(symbol)
    }

    fn display(&self, id: &InstrumentId) -> (String, String) {
        match self.universe.get(id) {
            Some(spec) => (spec.display_symbol.clone(), spec.display_name.clone()),
            None => (id.as_str().to_uppercase(), id.to_string()),
        }
    }

    /// Build a record from a primary ticker; `None` for symbols outside the
    /// session's index
    pub fn from_ticker(
        &self,
        ticker: &RawTicker,
        source: PriceSource,
        observed_at: OffsetDateTime,
    ) -> Option<PriceRecord> {
        let id = self.resolve(&ticker.symbol)?.clone();
        let (display_symbol, display_name) = self.display(&id);
        Some(PriceRecord {
            id,
            display_symbol,
            display_name,
            price: ticker.last_price,
            change_24h_pct: ticker.change_pct,
            high_24h: ticker.high,
            low_24h: ticker.low,
            volume_24h: ticker.volume,
            observed_at,
            source,
        })
    }

    /// Build a record from a secondary quote. The secondary source has no
    /// 24h range, so high/low are reported as zero.
    pub fn from_secondary(
        &self,
        quote: &SecondaryQuote,
        observed_at: OffsetDateTime,
    ) -> Option<PriceRecord> {
        if !self.secondary.contains(&quote.id) {
            return None;
        }
        let (display_symbol, display_name) = self.display(&quote.id);
        Some(PriceRecord {
            id: quote.id.clone(),
            display_symbol,
            display_name,
            price: quote.price,
            change_24h_pct: quote.change_24h_pct.unwrap_or(FixedPoint8::ZERO),
            high_24h: FixedPoint8::ZERO,
            low_24h: FixedPoint8::ZERO,
            volume_24h: quote.volume_24h.unwrap_or(FixedPoint8::ZERO),
            observed_at,
            source: PriceSource::PolledSecondary,
        })
    }

    /// Normalize and offer to the store
    pub fn ingest_ticker(&self, store: &PriceStore, ticker: &RawTicker, source: PriceSource) -> IngestOutcome {
        match self.from_ticker(ticker, source, OffsetDateTime::now_utc()) {
            Some(record) => store.upsert_outcome(record).into(),
            None => {
                tracing::debug!(target: "transport", "Dropping tick for unmapped symbol {}", ticker.symbol);
                IngestOutcome::Unmapped
            }
        }
    }

    pub fn ingest_secondary(&self, store: &PriceStore, quote: &SecondaryQuote) -> IngestOutcome {
        match self.from_secondary(quote, OffsetDateTime::now_utc()) {
            Some(record) => store.upsert_outcome(record).into(),
            None => {
                tracing::debug!(target: "transport", "Dropping secondary quote for {}", quote.id);
                IngestOutcome::Unmapped
            }
        }
    }

    pub fn secondary_ids(&self) -> &[InstrumentId] {
        &self.secondary
    }
}

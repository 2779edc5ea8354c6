//! Instrument identifiers and the configured instrument universe
//!
//! `InstrumentId` is the canonical id used everywhere in the engine,
//! `FeedSymbol` is the upstream provider's code. The universe fixes the
//! canonical ordering that paged listing relies on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical instrument identifier (e.g. "bitcoin")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Upstream feed symbol, always upper case (e.g. "BTCUSDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FeedSymbol(String);

impl FeedSymbol {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    /// Parse from raw wire bytes
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(bytes).ok()?;
        if s.is_empty() {
            return None;
        }
        Some(Self::new(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased stream name prefix used by websocket subscriptions
    pub fn stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl<'de> Deserialize<'de> for FeedSymbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

impl fmt::Display for FeedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedSymbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One configured instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: InstrumentId,
    pub display_symbol: String,
    pub display_name: String,
    /// Candidate feed symbols in priority order
    #[serde(default)]
    pub candidates: Vec<FeedSymbol>,
}

impl InstrumentSpec {
    pub fn new(id: &str, display_symbol: &str, display_name: &str, candidates: &[&str]) -> Self {
        Self {
            id: InstrumentId::new(id),
            display_symbol: display_symbol.to_string(),
            display_name: display_name.to_string(),
            candidates: candidates.iter().map(|c| FeedSymbol::new(c)).collect(),
        }
    }
}

/// Ordered instrument universe
#[derive(Debug, Clone, Default)]
pub struct InstrumentUniverse {
    specs: Vec<InstrumentSpec>,
}

impl InstrumentUniverse {
    pub fn new(specs: Vec<InstrumentSpec>) -> Self {
        Self { specs }
    }

    /// Built-in universe used when no instruments are configured
    pub fn default_set() -> Self {
        Self::new(vec![
            InstrumentSpec::new("bitcoin", "BTC", "Bitcoin", &["BTCUSDT", "BTCUSDC"]),
            InstrumentSpec::new("ethereum", "ETH", "Ethereum", &["ETHUSDT", "ETHUSDC"]),
            InstrumentSpec::new("binancecoin", "BNB", "BNB", &["BNBUSDT"]),
            InstrumentSpec::new("solana", "SOL", "Solana", &["SOLUSDT"]),
            InstrumentSpec::new("ripple", "XRP", "XRP", &["XRPUSDT"]),
            InstrumentSpec::new("cardano", "ADA", "Cardano", &["ADAUSDT"]),
            InstrumentSpec::new("dogecoin", "DOGE", "Dogecoin", &["DOGEUSDT"]),
            InstrumentSpec::new("tron", "TRX", "TRON", &["TRXUSDT"]),
            InstrumentSpec::new("avalanche-2", "AVAX", "Avalanche", &["AVAXUSDT"]),
            InstrumentSpec::new("chainlink", "LINK", "Chainlink", &["LINKUSDT"]),
            InstrumentSpec::new("polkadot", "DOT", "Polkadot", &["DOTUSDT"]),
            InstrumentSpec::new("the-open-network", "TON", "Toncoin", &["TONUSDT"]),
            InstrumentSpec::new("near", "NEAR", "NEAR Protocol", &["NEARUSDT"]),
            InstrumentSpec::new("uniswap", "UNI", "Uniswap", &["UNIUSDT"]),
            InstrumentSpec::new("litecoin", "LTC", "Litecoin", &["LTCUSDT"]),
            InstrumentSpec::new("sui", "SUI", "Sui", &["SUIUSDT"]),
            InstrumentSpec::new("aptos", "APT", "Aptos", &["APTUSDT"]),
            InstrumentSpec::new("arbitrum", "ARB", "Arbitrum", &["ARBUSDT"]),
            InstrumentSpec::new("optimism", "OP", "Optimism", &["OPUSDT"]),
            InstrumentSpec::new("monero", "XMR", "Monero", &[]),
        ])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[InstrumentSpec] {
        &self.specs
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&InstrumentSpec> {
        self.specs.iter().find(|s| &s.id == id)
    }

    /// Canonical ordering of all ids
    pub fn ordering(&self) -> Vec<InstrumentId> {
        self.specs.iter().map(|s| s.id.clone()).collect()
    }

    /// Number of pages of `page_size`; an empty universe still has one page
    pub fn page_count(&self, page_size: usize) -> usize {
        if page_size == 0 {
            return 0;
        }
        self.specs.len().div_ceil(page_size).max(1)
    }

    /// Slice `[page * size, (page + 1) * size)`; empty past the end
    pub fn page(&self, page: usize, page_size: usize) -> &[InstrumentSpec] {
        let start = page.saturating_mul(page_size).min(self.specs.len());
        let end = start.saturating_add(page_size).min(self.specs.len());
        &self.specs[start..end]
    }
}

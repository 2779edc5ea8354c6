//! Subscription manager for batched WebSocket subscriptions
//!
//! Splits a symbol set into SUBSCRIBE requests of at most `MAX_BATCH_SIZE`
//! streams and tracks which request ids the exchange has acknowledged.

use crate::core::FeedSymbol;
use std::collections::{HashMap, HashSet};

/// Maximum streams per subscription request (Binance limit)
pub const MAX_BATCH_SIZE: usize = 200;

/// Stream suffix for 24h rolling ticker snapshots
pub const TICKER_STREAM_SUFFIX: &str = "@ticker";

/// One SUBSCRIBE request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBatch {
    pub id: u64,
    pub symbols: Vec<FeedSymbol>,
}

impl SubscriptionBatch {
    /// Stream names, e.g. `btcusdt@ticker`
    pub fn params(&self) -> Vec<String> {
        self.symbols
            .iter()
            .map(|s| format!("{}{}", s.stream_name(), TICKER_STREAM_SUFFIX))
            .collect()
    }

    /// JSON request body
    pub fn to_request(&self) -> String {
        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": self.params(),
            "id": self.id,
        })
        .to_string()
    }
}

/// Tracks pending and acknowledged subscriptions for one connection
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    next_id: u64,
    pending: HashMap<u64, Vec<FeedSymbol>>,
    active: HashSet<FeedSymbol>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register symbols and build the batches to send
    ///
    /// Symbols already pending or active are skipped; duplicates collapse.
    pub fn request(&mut self, symbols: &[FeedSymbol]) -> Vec<SubscriptionBatch> {
        let mut seen = HashSet::new();
        let wanted: Vec<FeedSymbol> = symbols
            .iter()
            .filter(|s| !self.active.contains(*s) && !self.is_pending(s))
            .filter(|s| seen.insert((*s).clone()))
            .cloned()
            .collect();

        let mut batches = Vec::new();
        for chunk in wanted.chunks(MAX_BATCH_SIZE) {
            self.next_id += 1;
            let batch = SubscriptionBatch {
                id: self.next_id,
                symbols: chunk.to_vec(),
            };
            self.pending.insert(batch.id, batch.symbols.clone());
            batches.push(batch);
        }

        batches
    }

    /// Exchange acknowledged request `id`; returns how many symbols became active
    pub fn confirm(&mut self, id: u64) -> usize {
        match self.pending.remove(&id) {
            Some(symbols) => {
                let count = symbols.len();
                self.active.extend(symbols);
                count
            }
            None => 0,
        }
    }

    /// Exchange rejected request `id`; returns the symbols it carried
    pub fn reject(&mut self, id: u64) -> Vec<FeedSymbol> {
        self.pending.remove(&id).unwrap_or_default()
    }

    pub fn is_pending(&self, symbol: &FeedSymbol) -> bool {
        self.pending.values().any(|v| v.contains(symbol))
    }

    pub fn is_active(&self, symbol: &FeedSymbol) -> bool {
        self.active.contains(symbol)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(n: usize) -> Vec<FeedSymbol> {
        (0..n).map(|i| FeedSymbol::new(format!("SYM{i}USDT"))).collect()
    }

    #[test]
    fn test_request_batches_by_limit() {
        let mut manager = SubscriptionManager::new();
        let batches = manager.request(&symbols(450));

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].symbols.len(), 200);
        assert_eq!(batches[2].symbols.len(), 50);
        assert_eq!(batches.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(manager.pending_count(), 450);
    }

    #[test]
    fn test_request_message_format() {
        let mut manager = SubscriptionManager::new();
        let batch = manager.request(&[FeedSymbol::new("BTCUSDT")]).remove(0);

        let body: serde_json::Value = serde_json::from_str(&batch.to_request()).unwrap();
        assert_eq!(body["method"], "SUBSCRIBE");
        assert_eq!(body["params"][0], "btcusdt@ticker");
        assert_eq!(body["id"], 1);
    }

    #[test]
    fn test_confirm_and_reject() {
        let mut manager = SubscriptionManager::new();
        let btc = FeedSymbol::new("BTCUSDT");
        let eth = FeedSymbol::new("ETHUSDT");

        let first = manager.request(&[btc.clone()]).remove(0);
        let second = manager.request(&[eth.clone()]).remove(0);

        assert_eq!(manager.confirm(first.id), 1);
        assert!(manager.is_active(&btc));
        assert_eq!(manager.confirm(first.id), 0);

        assert_eq!(manager.reject(second.id), vec![eth.clone()]);
        assert!(!manager.is_pending(&eth));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_duplicates_skipped() {
        let mut manager = SubscriptionManager::new();
        let btc = FeedSymbol::new("BTCUSDT");

        let batches = manager.request(&[btc.clone(), btc.clone()]);
        assert_eq!(batches[0].symbols.len(), 1);
        assert!(manager.request(&[btc]).is_empty());

        manager.clear();
        assert_eq!(manager.pending_count(), 0);
    }
}

//! Instrument mapping between canonical ids and feed symbols
//!
//! Each canonical id carries candidate feed symbols in priority order. The
//! active symbol is the first candidate present in the feed's tradable
//! catalog. The catalog is fetched with a timeout and cached for a TTL; a
//! failed refresh keeps whatever was cached before.

use crate::core::{FeedSymbol, InstrumentId, InstrumentUniverse};
use crate::exchanges::traits::CatalogSource;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};

/// Default catalog cache lifetime
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(3600);

/// Default bound on one catalog fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Canonical id with its candidates and the currently active feed symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub id: InstrumentId,
    pub candidates: Vec<FeedSymbol>,
    pub active: Option<FeedSymbol>,
}

/// Result of resolving a requested id set
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Entries with an active symbol, sorted by id
    pub mapped: Vec<MappingEntry>,
    /// Ids without a present candidate, sorted
    pub unmapped: Vec<InstrumentId>,
    /// `mapped / requested`, 0.0 for an empty request
    pub coverage: f64,
}

impl Resolution {
    /// Resolution with nothing mapped
    pub fn unmapped_only(ids: Vec<InstrumentId>) -> Self {
        Self {
            mapped: Vec::new(),
            unmapped: ids,
            coverage: 0.0,
        }
    }

    /// Active feed symbols in mapped order
    pub fn feed_symbols(&self) -> Vec<FeedSymbol> {
        self.mapped.iter().filter_map(|e| e.active.clone()).collect()
    }

    /// Canonical id behind an active feed symbol of this resolution
    pub fn reverse_lookup(&self, symbol: &FeedSymbol) -> Option<&InstrumentId> {
        self.mapped
            .iter()
            .find(|e| e.active.as_ref() == Some(symbol))
            .map(|e| &e.id)
    }

    /// Feed symbol -> canonical id for this resolution only
    pub fn reverse_index(&self) -> HashMap<FeedSymbol, InstrumentId> {
        self.mapped
            .iter()
            .filter_map(|e| e.active.clone().map(|s| (s, e.id.clone())))
            .collect()
    }
}

struct CatalogCache {
    symbols: Arc<HashSet<FeedSymbol>>,
    fetched_at: Instant,
    invalidated: bool,
}

/// Maps canonical ids to feed symbols against a cached catalog
pub struct InstrumentMapper {
    source: Arc<dyn CatalogSource>,
    candidates: HashMap<InstrumentId, Vec<FeedSymbol>>,
    /// Held across the fetch so concurrent resolves share one refresh
    cache: Mutex<Option<CatalogCache>>,
    catalog_ttl: Duration,
    fetch_timeout: Duration,
}

impl InstrumentMapper {
    pub fn new(source: Arc<dyn CatalogSource>, universe: &InstrumentUniverse) -> Self {
        let candidates = universe
            .specs()
            .iter()
            .map(|s| (s.id.clone(), s.candidates.clone()))
            .collect();

        Self {
            source,
            candidates,
            cache: Mutex::new(None),
            catalog_ttl: DEFAULT_CATALOG_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override cache lifetime and fetch timeout
    pub fn with_timing(mut self, catalog_ttl: Duration, fetch_timeout: Duration) -> Self {
        self.catalog_ttl = catalog_ttl;
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Resolve a set of canonical ids (order and duplicates do not matter)
    pub async fn resolve(&self, ids: &[InstrumentId]) -> Resolution {
        let requested: BTreeSet<&InstrumentId> = ids.iter().collect();
        if requested.is_empty() {
            return Resolution::unmapped_only(Vec::new());
        }

        let catalog = match self.catalog().await {
            Some(catalog) => catalog,
            None => {
                tracing::warn!(
                    target: "mapper",
                    "No catalog available, {} instruments left unmapped",
                    requested.len()
                );
                return Resolution::unmapped_only(requested.into_iter().cloned().collect());
            }
        };

        let mut mapped = Vec::new();
        let mut unmapped = Vec::new();

        for id in &requested {
            let candidates = self.candidates.get(*id).cloned().unwrap_or_default();
            match candidates.iter().find(|c| catalog.contains(*c)).cloned() {
                Some(active) => mapped.push(MappingEntry {
                    id: (*id).clone(),
                    candidates,
                    active: Some(active),
                }),
                None => unmapped.push((*id).clone()),
            }
        }

        let coverage = mapped.len() as f64 / requested.len() as f64;
        tracing::info!(
            target: "mapper",
            "Resolved {}/{} instruments (coverage {:.2})",
            mapped.len(),
            requested.len(),
            coverage
        );

        Resolution {
            mapped,
            unmapped,
            coverage,
        }
    }

    /// Age of the cached catalog, if any
    pub async fn catalog_age(&self) -> Option<Duration> {
        self.cache.lock().await.as_ref().map(|c| c.fetched_at.elapsed())
    }

    /// Force the next resolve to refetch (the stale copy stays as fallback)
    pub async fn invalidate_catalog(&self) {
        if let Some(cache) = self.cache.lock().await.as_mut() {
            cache.invalidated = true;
        }
    }

    async fn catalog(&self) -> Option<Arc<HashSet<FeedSymbol>>> {
        let mut cache = self.cache.lock().await;

        let fresh = cache
            .as_ref()
            .is_some_and(|c| !c.invalidated && c.fetched_at.elapsed() < self.catalog_ttl);

        if !fresh {
            match timeout(self.fetch_timeout, self.source.fetch_catalog()).await {
                Ok(Ok(symbols)) => {
                    tracing::info!(target: "mapper", "Catalog refreshed: {} tradable symbols", symbols.len());
                    *cache = Some(CatalogCache {
                        symbols: Arc::new(symbols.into_iter().collect()),
                        fetched_at: Instant::now(),
                        invalidated: false,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(target: "mapper", "Catalog refresh failed: {} (stale cache kept: {})", e, cache.is_some());
                }
                Err(_) => {
                    tracing::warn!(
                        target: "mapper",
                        "Catalog refresh timed out after {:?} (stale cache kept: {})",
                        self.fetch_timeout,
                        cache.is_some()
                    );
                }
            }
        }

        cache.as_ref().map(|c| c.symbols.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InstrumentSpec;
    use crate::test_utils::StaticCatalog;

    fn universe() -> InstrumentUniverse {
        InstrumentUniverse::new(vec![
            InstrumentSpec::new("bitcoin", "BTC", "Bitcoin", &["BTCUSDT", "BTCUSDC"]),
            InstrumentSpec::new("ethereum", "ETH", "Ethereum", &["ETHUSDT"]),
            InstrumentSpec::new("usdc-only", "X", "X", &["XUSDT", "XUSDC"]),
            InstrumentSpec::new("monero", "XMR", "Monero", &[]),
        ])
    }

    fn ids(list: &[&str]) -> Vec<InstrumentId> {
        list.iter().map(|s| InstrumentId::new(*s)).collect()
    }

    #[tokio::test]
    async fn test_resolve_picks_first_present_candidate() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT", "BTCUSDC", "XUSDC"]));
        let mapper = InstrumentMapper::new(catalog, &universe());

        let res = mapper.resolve(&ids(&["bitcoin", "usdc-only", "monero", "ethereum"])).await;

        assert_eq!(res.mapped.len(), 2);
        assert_eq!(res.mapped[0].id.as_str(), "bitcoin");
        assert_eq!(res.mapped[0].active, Some(FeedSymbol::new("BTCUSDT")));
        assert_eq!(res.mapped[1].active, Some(FeedSymbol::new("XUSDC")));
        assert_eq!(res.unmapped, ids(&["ethereum", "monero"]));
        assert!((res.coverage - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_resolve_deterministic_and_order_independent() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT", "ETHUSDT"]));
        let mapper = InstrumentMapper::new(catalog, &universe());

        let a = mapper.resolve(&ids(&["monero", "bitcoin", "ethereum"])).await;
        let b = mapper.resolve(&ids(&["ethereum", "bitcoin", "monero", "bitcoin"])).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_coverage_arithmetic() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT", "ETHUSDT"]));
        let mapper = InstrumentMapper::new(catalog.clone(), &universe());

        let empty = mapper.resolve(&[]).await;
        assert_eq!(empty.coverage, 0.0);
        assert!(empty.mapped.is_empty() && empty.unmapped.is_empty());
        // Empty requests never touch the catalog
        assert_eq!(catalog.fetch_count(), 0);

        let all = mapper.resolve(&ids(&["bitcoin", "ethereum"])).await;
        assert_eq!(all.coverage, 1.0);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_cache() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT"]));
        catalog.set_failing(true);
        let mapper = InstrumentMapper::new(catalog, &universe());

        let res = mapper.resolve(&ids(&["bitcoin", "ethereum"])).await;
        assert!(res.mapped.is_empty());
        assert_eq!(res.unmapped, ids(&["bitcoin", "ethereum"]));
        assert_eq!(res.coverage, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_reused_within_ttl() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT"]));
        let mapper = InstrumentMapper::new(catalog.clone(), &universe())
            .with_timing(Duration::from_secs(60), Duration::from_secs(1));

        mapper.resolve(&ids(&["bitcoin"])).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        mapper.resolve(&ids(&["bitcoin"])).await;
        assert_eq!(catalog.fetch_count(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        mapper.resolve(&ids(&["bitcoin"])).await;
        assert_eq!(catalog.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cache_survives_failed_refresh() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT"]));
        let mapper = InstrumentMapper::new(catalog.clone(), &universe())
            .with_timing(Duration::from_secs(60), Duration::from_secs(1));

        assert_eq!(mapper.resolve(&ids(&["bitcoin"])).await.coverage, 1.0);

        catalog.set_failing(true);
        tokio::time::advance(Duration::from_secs(120)).await;

        let res = mapper.resolve(&ids(&["bitcoin"])).await;
        assert_eq!(catalog.fetch_count(), 2);
        assert_eq!(res.coverage, 1.0);
        assert_eq!(res.mapped[0].active, Some(FeedSymbol::new("BTCUSDT")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_catalog_is_time_boxed() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT"]));
        catalog.set_hanging(true);
        let mapper = InstrumentMapper::new(catalog, &universe())
            .with_timing(Duration::from_secs(60), Duration::from_secs(2));

        let res = mapper.resolve(&ids(&["bitcoin"])).await;
        assert_eq!(res.unmapped, ids(&["bitcoin"]));
    }

    #[tokio::test]
    async fn test_reverse_lookup() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDC", "ETHUSDT"]));
        let mapper = InstrumentMapper::new(catalog, &universe());

        let res = mapper.resolve(&ids(&["bitcoin", "ethereum"])).await;
        assert_eq!(
            res.reverse_lookup(&FeedSymbol::new("BTCUSDC")),
            Some(&InstrumentId::new("bitcoin"))
        );
        assert_eq!(res.reverse_lookup(&FeedSymbol::new("BTCUSDT")), None);
        assert_eq!(res.reverse_index().len(), 2);

        // A later resolution carries only its own symbols
        let next = mapper.resolve(&ids(&["ethereum"])).await;
        assert_eq!(next.reverse_lookup(&FeedSymbol::new("BTCUSDC")), None);
        assert_eq!(next.reverse_index().len(), 1);
        assert_eq!(
            res.feed_symbols(),
            vec![FeedSymbol::new("BTCUSDC"), FeedSymbol::new("ETHUSDT")]
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let catalog = Arc::new(StaticCatalog::new(&["BTCUSDT"]));
        let mapper = InstrumentMapper::new(catalog.clone(), &universe());

        mapper.resolve(&ids(&["bitcoin"])).await;
        assert!(mapper.catalog_age().await.is_some());
        mapper.invalidate_catalog().await;
        mapper.resolve(&ids(&["bitcoin"])).await;
        assert_eq!(catalog.fetch_count(), 2);
    }
}

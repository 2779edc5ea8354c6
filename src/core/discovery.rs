//! Tradable symbol catalog (cold path)
//!
//! Fetches the exchange's symbol list from its REST API and keeps only
//! symbols whose status is TRADING. Consumed by the instrument mapper.

use crate::core::FeedSymbol;
use crate::exchanges::traits::CatalogSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Default REST base for the primary feed
pub const DEFAULT_REST_URL: &str = "https://api.binance.com";

/// Catalog client for a Binance-style `exchangeInfo` endpoint
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    /// Create new catalog client
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .user_agent("market-sync/0.1")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch all symbols currently marked TRADING
    ///
    /// API: GET {base}/api/v3/exchangeInfo
    pub async fn fetch_tradable(&self) -> Result<Vec<FeedSymbol>, DiscoveryError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);

        tracing::info!(target: "mapper", "Fetching symbol catalog from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Http(response.status().as_u16()));
        }

        let info: ExchangeInfo = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;

        let symbols = tradable_symbols(info);
        if symbols.is_empty() {
            return Err(DiscoveryError::NoSymbols);
        }

        Ok(symbols)
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch_catalog(&self) -> Result<Vec<FeedSymbol>, DiscoveryError> {
        self.fetch_tradable().await
    }
}

fn tradable_symbols(info: ExchangeInfo) -> Vec<FeedSymbol> {
    info.symbols
        .into_iter()
        .filter(|s| s.status == "TRADING")
        .map(|s| FeedSymbol::new(s.symbol))
        .collect()
}

// === API Response Types ===

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    status: String,
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("No symbols found")]
    NoSymbols,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_info_filters_trading() {
        let json = r#"{
            "timezone": "UTC",
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING", "baseAsset": "BTC"},
                {"symbol": "LUNAUSDT", "status": "BREAK", "baseAsset": "LUNA"},
                {"symbol": "ethusdt", "status": "TRADING", "baseAsset": "ETH"}
            ]
        }"#;
        let info: ExchangeInfo = serde_json::from_str(json).unwrap();
        let symbols = tradable_symbols(info);

        assert_eq!(symbols, vec![FeedSymbol::new("BTCUSDT"), FeedSymbol::new("ETHUSDT")]);
    }

    #[test]
    fn test_base_url_normalized() {
        let client = CatalogClient::new("https://api.binance.com/", Duration::from_secs(5));
        assert_eq!(client.base_url, DEFAULT_REST_URL);
    }
}

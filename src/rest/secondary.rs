//! Secondary price source (CoinGecko-style `simple/price`)
//!
//! Serves canonical ids the primary feed has no symbol for. Canonical ids
//! double as the source's coin ids.

use crate::core::{FixedPoint8, InstrumentId, SecondaryQuote};
use crate::exchanges::traits::{SecondarySource, TransportError};
use crate::rest::ticker::classify_status;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Default secondary API base
pub const DEFAULT_SECONDARY_URL: &str = "https://api.coingecko.com";

/// `{"bitcoin": {"usd": 67187.3, "usd_24h_change": 3.6, "usd_24h_vol": 1.2e10}}`
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoSource {
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

    fn price_url(&self, ids: &[InstrumentId], currency: &str) -> Result<url::Url, TransportError> {
        let joined = ids.iter().map(InstrumentId::as_str).collect::<Vec<_>>().join(",");
        url::Url::parse_with_params(
            &format!("{}/api/v3/simple/price", self.base_url),
            &[
                ("ids", joined.as_str()),
                ("vs_currencies", currency),
                ("include_24hr_change", "true"),
                ("include_24hr_vol", "true"),
            ],
        )
        .map_err(|e| TransportError::Connect(e.to_string()))
    }
}

/// Turn the response map into quotes; ids without a usable price are skipped
fn quotes_from(response: SimplePriceResponse, currency: &str) -> Vec<SecondaryQuote> {
    let change_key = format!("{currency}_24h_change");
    let volume_key = format!("{currency}_24h_vol");

    let mut quotes: Vec<SecondaryQuote> = response
        .into_iter()
        .filter_map(|(id, fields)| {
            let price = FixedPoint8::from_f64(fields.get(currency).copied().flatten()?)?;
            let field = |key: &str| fields.get(key).copied().flatten().and_then(FixedPoint8::from_f64);
            Some(SecondaryQuote {
                id: InstrumentId::new(id),
                price,
                change_24h_pct: field(&change_key),
                volume_24h: field(&volume_key),
            })
        })
        .collect();
    quotes.sort_by(|a, b| a.id.cmp(&b.id));
    quotes
}

#[async_trait]
impl SecondarySource for CoinGeckoSource {
    async fn fetch_prices(
        &self,
        ids: &[InstrumentId],
        currency: &str,
    ) -> Result<Vec<SecondaryQuote>, TransportError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let currency = currency.to_ascii_lowercase();
        let url = self.price_url(ids, &currency)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body: SimplePriceResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))?;

        Ok(quotes_from(body, &currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_url() {
        let source = CoinGeckoSource::new(DEFAULT_SECONDARY_URL, Duration::from_secs(5));
        let url = source
            .price_url(&[InstrumentId::new("monero"), InstrumentId::new("zcash")], "usd")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=monero%2Czcash&vs_currencies=usd&include_24hr_change=true&include_24hr_vol=true"
        );
    }

    #[test]
    fn test_quotes_from_response() {
        let json = r#"{
            "monero": {"usd": 160.25, "usd_24h_change": -1.5, "usd_24h_vol": 5000000.0},
            "zcash": {"usd": 30.0, "usd_24h_change": null},
            "dead-coin": {}
        }"#;
        let response: SimplePriceResponse = serde_json::from_str(json).unwrap();
        let quotes = quotes_from(response, "usd");

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].id.as_str(), "monero");
        assert_eq!(quotes[0].price, "160.25".parse().unwrap());
        assert_eq!(quotes[0].change_24h_pct, Some("-1.5".parse().unwrap()));
        assert_eq!(quotes[1].change_24h_pct, None);
        assert_eq!(quotes[1].volume_24h, None);
    }
}

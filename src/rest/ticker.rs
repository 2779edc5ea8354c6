//! REST 24h ticker poller for the primary feed
//!
//! One request per symbol; used both as stream fallback and steady polling.

use crate::core::{FeedSymbol, RawTicker};
use crate::exchanges::parsing::BinanceParser;
use crate::exchanges::traits::{TickerPoller, TransportError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Binance `GET /api/v3/ticker/24hr?symbol=` client
pub struct BinanceRestPoller {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceRestPoller {
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

    fn ticker_url(&self, symbol: &FeedSymbol) -> Result<url::Url, TransportError> {
        url::Url::parse_with_params(
            &format!("{}/api/v3/ticker/24hr", self.base_url),
            &[("symbol", symbol.as_str())],
        )
        .map_err(|e| TransportError::Connect(e.to_string()))
    }
}

/// 429 and 418 are Binance's rate-limit and IP-ban codes
pub(crate) fn classify_status(status: StatusCode) -> Option<TransportError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
        Some(TransportError::RateLimited)
    } else {
        Some(TransportError::Http(status.as_u16()))
    }
}

#[async_trait]
impl TickerPoller for BinanceRestPoller {
    async fn fetch_ticker(&self, symbol: &FeedSymbol) -> Result<RawTicker, TransportError> {
        let url = self.ticker_url(symbol)?;

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

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        BinanceParser::parse_rest_ticker(&body)
            .ok_or_else(|| TransportError::Parse(format!("unparseable ticker for {}", symbol)))
    }
}

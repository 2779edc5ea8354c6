//! Binance WebSocket ticker stream
//!
//! Subscribes to `<symbol>@ticker` streams and turns frames into
//! `StreamEvent`s. Keeps the connection alive with periodic pings and treats
//! a silent connection as an abnormal close.

use crate::core::FeedSymbol;
use crate::exchanges::parsing::{BinanceMessageType, BinanceParser};
use crate::exchanges::traits::{CloseKind, StreamConnector, StreamEvent, TickStream, TransportError};
use crate::ws::connection::{classify_close, WebSocketConnection, WebSocketError};
use crate::ws::subscription::SubscriptionManager;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Binance spot WebSocket URL
pub const WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Opens Binance ticker subscriptions
#[derive(Debug, Clone)]
pub struct BinanceStreamConnector {
    url: String,
    connect_timeout: Duration,
    ping_interval: Duration,
    idle_timeout: Duration,
}

impl BinanceStreamConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timing(mut self, connect_timeout: Duration, ping_interval: Duration, idle_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.ping_interval = ping_interval;
        self.idle_timeout = idle_timeout;
        self
    }
}

impl Default for BinanceStreamConnector {
    fn default() -> Self {
        Self::new(WS_URL)
    }
}

#[async_trait]
impl StreamConnector for BinanceStreamConnector {
    async fn connect(&self, symbols: &[FeedSymbol]) -> Result<Box<dyn TickStream>, TransportError> {
        let mut conn = WebSocketConnection::connect(&self.url, self.connect_timeout)
            .await
            .map_err(|e| match e {
                WebSocketError::Timeout => TransportError::Timeout,
                other => TransportError::Connect(other.to_string()),
            })?;

        let mut subscriptions = SubscriptionManager::new();
        for batch in subscriptions.request(symbols) {
            crate::log_ws!(
                tracing::Level::DEBUG,
                "SUBSCRIBE id={} with {} streams",
                batch.id,
                batch.symbols.len()
            );
            conn.send_text(&batch.to_request())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }

        crate::log_ws!(
            tracing::Level::INFO,
            "Binance stream open at {} for {} symbols",
            self.url,
            symbols.len()
        );

        let mut ping = interval(self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; skip it
        ping.reset();

        Ok(Box::new(BinanceStream {
            conn,
            subscriptions,
            ping,
            idle_timeout: self.idle_timeout,
        }))
    }
}

/// Open Binance ticker subscription
pub struct BinanceStream {
    conn: WebSocketConnection,
    subscriptions: SubscriptionManager,
    ping: Interval,
    idle_timeout: Duration,
}

/// Map one text frame; `None` means nothing worth surfacing
fn handle_text(subscriptions: &mut SubscriptionManager, data: &[u8]) -> Option<StreamEvent> {
    match BinanceParser::detect_message_type(data) {
        BinanceMessageType::Ticker => Some(match BinanceParser::parse_ticker(data) {
            Some(ticker) => StreamEvent::Tick(ticker),
            None => StreamEvent::Malformed(String::from_utf8_lossy(data).into_owned()),
        }),
        BinanceMessageType::SubscriptionResponse => {
            if let Some(id) = BinanceParser::parse_ack_id(data) {
                let confirmed = subscriptions.confirm(id);
                crate::log_ws!(tracing::Level::DEBUG, "Subscription {} confirmed ({} streams)", id, confirmed);
            }
            None
        }
        BinanceMessageType::Error => {
            let rejected = BinanceParser::parse_ack_id(data)
                .map(|id| subscriptions.reject(id))
                .unwrap_or_default();
            crate::log_ws!(
                tracing::Level::WARN,
                "Binance error frame ({} streams rejected): {}",
                rejected.len(),
                String::from_utf8_lossy(data)
            );
            None
        }
        BinanceMessageType::Unknown => None,
    }
}

#[async_trait]
impl TickStream for BinanceStream {
    async fn next_event(&mut self) -> StreamEvent {
        loop {
            let idle_left = self.idle_timeout.saturating_sub(self.conn.idle_duration());

            tokio::select! {
                msg = self.conn.recv() => match msg {
                    Ok(Some(Message::Text(text))) => {
                        if let Some(event) = handle_text(&mut self.subscriptions, text.as_bytes()) {
                            return event;
                        }
                    }
                    Ok(Some(Message::Close(frame))) => {
                        let kind = classify_close(frame.as_ref());
                        crate::log_ws!(tracing::Level::INFO, "Binance stream closed: {:?}", kind);
                        return StreamEvent::Closed(kind);
                    }
                    // Pings are answered by tungstenite on the next read/write
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        return StreamEvent::Closed(CloseKind::Abnormal("stream ended without close frame".into()));
                    }
                    Err(e) => return StreamEvent::Closed(CloseKind::Abnormal(e.to_string())),
                },
                _ = self.ping.tick() => {
                    if let Err(e) = self.conn.send_ping().await {
                        return StreamEvent::Closed(CloseKind::Abnormal(format!("ping failed: {e}")));
                    }
                }
                _ = sleep(idle_left) => {
                    return StreamEvent::Closed(CloseKind::Abnormal(format!(
                        "no frames for {:?}",
                        self.idle_timeout
                    )));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.conn.close().await;
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER: &[u8] = br#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","P":"1.5","c":"100.5","h":"101","l":"99","v":"10"}"#;

    #[test]
    fn test_ticker_frame_becomes_tick() {
        let mut subs = SubscriptionManager::new();
        match handle_text(&mut subs, TICKER) {
            Some(StreamEvent::Tick(t)) => {
                assert_eq!(t.symbol.as_str(), "BTCUSDT");
                assert_eq!(t.last_price, "100.5".parse().unwrap());
            }
            other => panic!("expected tick, got {:?}", other),
        }
    }

    #[test]
    fn test_broken_ticker_is_malformed() {
        let mut subs = SubscriptionManager::new();
        let frame = br#"{"e":"24hrTicker","s":"BTCUSDT","c":"oops"}"#;
        assert!(matches!(handle_text(&mut subs, frame), Some(StreamEvent::Malformed(_))));
    }

    #[test]
    fn test_acks_and_errors_update_subscriptions() {
        let mut subs = SubscriptionManager::new();
        let batches = subs.request(&[FeedSymbol::new("BTCUSDT"), FeedSymbol::new("ETHUSDT")]);
        assert_eq!(batches.len(), 1);

        assert!(handle_text(&mut subs, br#"{"result":null,"id":1}"#).is_none());
        assert_eq!(subs.active_count(), 2);

        let more = subs.request(&[FeedSymbol::new("SOLUSDT")]);
        let error = format!(r#"{{"error":{{"code":2,"msg":"Invalid request"}},"id":{}}}"#, more[0].id);
        assert!(handle_text(&mut subs, error.as_bytes()).is_none());
        assert_eq!(subs.pending_count(), 0);
        assert_eq!(subs.active_count(), 2);
    }

    #[test]
    fn test_connector_defaults() {
        let connector = BinanceStreamConnector::default();
        assert_eq!(connector.url, WS_URL);
        assert_eq!(connector.idle_timeout, Duration::from_secs(30));
    }
}

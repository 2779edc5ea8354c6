//! Binance ticker parser
//!
//! Parses `24hrTicker` stream frames and REST `/api/v3/ticker/24hr` bodies
//! into `RawTicker`. Any missing or non-numeric field rejects the whole frame.

use super::{contains, find_field, parse_u64};
use crate::core::{FeedSymbol, FixedPoint8, RawTicker};

/// Binance message parser
pub struct BinanceParser;

impl BinanceParser {
    /// Parse a `24hrTicker` stream frame
    ///
    /// Binance 24hrTicker format (abridged):
    /// {
    ///   "e": "24hrTicker",
    ///   "E": 1672515782136,
    ///   "s": "BTCUSDT",
    ///   "P": "-0.263",
    ///   "c": "16540.25",
    ///   "h": "16650.00",
    ///   "l": "16490.11",
    ///   "v": "182301.52"
    /// }
    #[inline]
    pub fn parse_ticker(data: &[u8]) -> Option<RawTicker> {
        if !Self::is_ticker(data) {
            return None;
        }

        Some(RawTicker {
            symbol: FeedSymbol::from_bytes(find_field(data, b"s")?)?,
            last_price: FixedPoint8::parse_bytes(find_field(data, b"c")?)?,
            change_pct: FixedPoint8::parse_bytes(find_field(data, b"P")?)?,
            high: FixedPoint8::parse_bytes(find_field(data, b"h")?)?,
            low: FixedPoint8::parse_bytes(find_field(data, b"l")?)?,
            volume: FixedPoint8::parse_bytes(find_field(data, b"v")?)?,
        })
    }

    /// Parse a REST 24hr ticker body
    ///
    /// {"symbol":"BTCUSDT","priceChangePercent":"-0.263","lastPrice":"16540.25",
    ///  "highPrice":"16650.00","lowPrice":"16490.11","volume":"182301.52", ...}
    #[inline]
    pub fn parse_rest_ticker(data: &[u8]) -> Option<RawTicker> {
        Some(RawTicker {
            symbol: FeedSymbol::from_bytes(find_field(data, b"symbol")?)?,
            last_price: FixedPoint8::parse_bytes(find_field(data, b"lastPrice")?)?,
            change_pct: FixedPoint8::parse_bytes(find_field(data, b"priceChangePercent")?)?,
            high: FixedPoint8::parse_bytes(find_field(data, b"highPrice")?)?,
            low: FixedPoint8::parse_bytes(find_field(data, b"lowPrice")?)?,
            volume: FixedPoint8::parse_bytes(find_field(data, b"volume")?)?,
        })
    }

    /// Request id of a subscription acknowledgement
    #[inline]
    pub fn parse_ack_id(data: &[u8]) -> Option<u64> {
        parse_u64(find_field(data, b"id")?)
    }

    #[inline(always)]
    fn is_ticker(data: &[u8]) -> bool {
        contains(data, b"24hrTicker")
    }

    /// Detect message type without full parsing
    #[inline]
    pub fn detect_message_type(data: &[u8]) -> BinanceMessageType {
        if Self::is_ticker(data) {
            BinanceMessageType::Ticker
        } else if contains(data, br#""result":null"#) {
            BinanceMessageType::SubscriptionResponse
        } else if contains(data, br#""error""#) || contains(data, br#""code""#) {
            BinanceMessageType::Error
        } else {
            BinanceMessageType::Unknown
        }
    }
}

/// Binance message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceMessageType {
    Ticker,
    SubscriptionResponse,
    Error,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER_MSG: &[u8] = br#"{
        "e": "24hrTicker",
        "E": 1672515782136,
        "s": "BTCUSDT",
        "p": "-43.60",
        "P": "-0.263",
        "w": "16560.01",
        "c": "16540.25",
        "Q": "0.01",
        "o": "16583.85",
        "h": "16650.00",
        "l": "16490.11",
        "v": "182301.52",
        "q": "3018955000.12",
        "O": 1672429382136,
        "C": 1672515782136,
        "n": 1200
    }"#;

    const REST_BODY: &[u8] = br#"{"symbol":"ETHUSDT","priceChange":"12.1","priceChangePercent":"0.750","weightedAvgPrice":"1601.2","lastPrice":"1612.34","highPrice":"1630.00","lowPrice":"1590.50","volume":"402113.9","quoteVolume":"1.2","count":5}"#;

    #[test]
    fn test_detect_message_type() {
        assert_eq!(BinanceParser::detect_message_type(TICKER_MSG), BinanceMessageType::Ticker);
        assert_eq!(
            BinanceParser::detect_message_type(br#"{"result":null,"id":1}"#),
            BinanceMessageType::SubscriptionResponse
        );
        assert_eq!(
            BinanceParser::detect_message_type(br#"{"error":{"code":2,"msg":"Invalid request"},"id":3}"#),
            BinanceMessageType::Error
        );
        assert_eq!(BinanceParser::detect_message_type(b"{}"), BinanceMessageType::Unknown);
    }

    #[test]
    fn test_parse_ticker() {
        let t = BinanceParser::parse_ticker(TICKER_MSG).unwrap();
        assert_eq!(t.symbol.as_str(), "BTCUSDT");
        assert_eq!(t.last_price, "16540.25".parse().unwrap());
        assert_eq!(t.change_pct, "-0.263".parse().unwrap());
        assert_eq!(t.high, "16650".parse().unwrap());
        assert_eq!(t.low, "16490.11".parse().unwrap());
        assert_eq!(t.volume, "182301.52".parse().unwrap());
    }

    #[test]
    fn test_parse_rest_ticker() {
        let t = BinanceParser::parse_rest_ticker(REST_BODY).unwrap();
        assert_eq!(t.symbol.as_str(), "ETHUSDT");
        assert_eq!(t.last_price, "1612.34".parse().unwrap());
        assert_eq!(t.change_pct, "0.75".parse().unwrap());
    }

    #[test]
    fn test_parse_rejects_partial_or_non_numeric() {
        assert!(BinanceParser::parse_ticker(br#"{"e":"24hrTicker","s":"BTCUSDT"}"#).is_none());
        assert!(BinanceParser::parse_ticker(
            br#"{"e":"24hrTicker","s":"BTCUSDT","c":"abc","P":"0","h":"1","l":"1","v":"1"}"#
        )
        .is_none());
        assert!(BinanceParser::parse_ticker(br#"{"e":"aggTrade","s":"BTCUSDT"}"#).is_none());
    }

    #[test]
    fn test_parse_ack_id() {
        assert_eq!(BinanceParser::parse_ack_id(br#"{"result":null,"id":42}"#), Some(42));
        assert_eq!(BinanceParser::parse_ack_id(br#"{"result":null}"#), None);
    }
}

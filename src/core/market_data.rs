//! Market data types
//!
//! `RawTicker` is the strict parse of one upstream ticker snapshot.
//! `PriceRecord` is what the price store keeps per canonical id.

use super::{FeedSymbol, FixedPoint8, InstrumentId};
use serde::Serialize;
use time::OffsetDateTime;

/// Where an accepted price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    Stream,
    PolledPrimary,
    PolledSecondary,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Stream => "stream",
            PriceSource::PolledPrimary => "polled-primary",
            PriceSource::PolledSecondary => "polled-secondary",
        }
    }
}

/// 24h ticker snapshot keyed by feed symbol (stream or REST)
#[derive(Debug, Clone, PartialEq)]
pub struct RawTicker {
    pub symbol: FeedSymbol,
    pub last_price: FixedPoint8,
    pub change_pct: FixedPoint8,
    pub high: FixedPoint8,
    pub low: FixedPoint8,
    pub volume: FixedPoint8,
}

/// Price from the secondary source, keyed by canonical id
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryQuote {
    pub id: InstrumentId,
    pub price: FixedPoint8,
    pub change_24h_pct: Option<FixedPoint8>,
    pub volume_24h: Option<FixedPoint8>,
}

/// One instrument's latest accepted state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub id: InstrumentId,
    pub display_symbol: String,
    pub display_name: String,
    pub price: FixedPoint8,
    #[serde(rename = "change24hPct")]
    pub change_24h_pct: FixedPoint8,
    #[serde(rename = "high24h")]
    pub high_24h: FixedPoint8,
    #[serde(rename = "low24h")]
    pub low_24h: FixedPoint8,
    #[serde(rename = "volume24h")]
    pub volume_24h: FixedPoint8,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    pub source: PriceSource,
}

/// Why a candidate record was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecordRejection {
    #[error("price must be positive")]
    NonPositivePrice,
    #[error("{0} must not be negative")]
    NegativeField(&'static str),
    #[error("high24h below low24h")]
    InvertedRange,
}

impl PriceRecord {
    /// Acceptance invariants for the store
    pub fn validate(&self) -> Result<(), RecordRejection> {
        if !self.price.is_positive() {
            return Err(RecordRejection::NonPositivePrice);
        }
        for (name, value) in [
            ("high24h", self.high_24h),
            ("low24h", self.low_24h),
            ("volume24h", self.volume_24h),
        ] {
            if value.is_negative() {
                return Err(RecordRejection::NegativeField(name));
            }
        }
        if self.high_24h < self.low_24h {
            return Err(RecordRejection::InvertedRange);
        }
        Ok(())
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

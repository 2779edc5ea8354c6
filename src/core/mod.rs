//! Core types
//!
//! - FixedPoint8: fixed-point decimal for prices
//! - InstrumentId / FeedSymbol: the two naming schemes
//! - PriceRecord / RawTicker: market data
//! - InstrumentMapper: canonical id <-> feed symbol resolution

pub mod discovery;
pub mod fixed_point;
pub mod instrument;
pub mod market_data;
pub mod symbol_map;

pub use discovery::{CatalogClient, DiscoveryError};
pub use fixed_point::FixedPoint8;
pub use instrument::{FeedSymbol, InstrumentId, InstrumentSpec, InstrumentUniverse};
pub use market_data::{PriceRecord, PriceSource, RawTicker, RecordRejection, SecondaryQuote};
pub use symbol_map::{InstrumentMapper, MappingEntry, Resolution};

//! Exchange-specific implementations

pub mod binance;
pub mod parsing;
pub mod traits;

pub use binance::{BinanceStream, BinanceStreamConnector};
pub use parsing::{BinanceMessageType, BinanceParser};
pub use traits::{
    CatalogSource, CloseKind, SecondarySource, StreamConnector, StreamEvent, TickStream,
    TickerPoller, TransportError,
};

//! REST clients for polling and the secondary price source

pub mod secondary;
pub mod ticker;

pub use secondary::{CoinGeckoSource, DEFAULT_SECONDARY_URL};
pub use ticker::BinanceRestPoller;

//! Hot path: price store and ingest normalization
//!
//! Every accepted tick passes through here. Readers never wait on network
//! and the write lock covers a single `Arc` swap.

pub mod normalize;
pub mod store;

pub use normalize::{IngestOutcome, Normalizer};
pub use store::{PriceLookup, PriceSnapshot, PriceStore, Subscription, UpsertOutcome};

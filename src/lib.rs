//! Live market data synchronization engine
//!
//! Supervises one upstream transport (websocket stream with REST polling
//! fallback), keeps a shared latest-price snapshot per instrument and fires
//! threshold alerts against it.

pub mod alerts;
pub mod core;
pub mod engine;
pub mod exchanges;
pub mod hot_path;
pub mod infrastructure;
pub mod rest;
pub mod transport;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use engine::{EngineDeps, EngineStatus, SyncEngine};
pub use infrastructure::config::Config;

use thiserror::Error;

/// Main error type for the sync engine
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("REST API error: {0}")]
    RestApi(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Page {page} out of range (page count {page_count})")]
    InvalidPage { page: usize, page_count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SyncError>;

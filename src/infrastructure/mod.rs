//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Logging and metrics
//! - Configuration management
//! - Status API

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;

pub use api::{router, serve};
pub use config::{Config, ConfigError};
pub use metrics::{MetricsCollector, MetricsSnapshot};

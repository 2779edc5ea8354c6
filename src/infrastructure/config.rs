//! Configuration management for the sync engine
//!
//! Loads configuration from config.toml at startup.
//! All values are configurable to avoid hardcoded constants; every field
//! has a default so a partial file (or no file at all) works.

use crate::alerts::{AlertRule, Direction, RuleId};
use crate::core::discovery::DEFAULT_REST_URL;
use crate::core::{FixedPoint8, InstrumentId, InstrumentSpec, InstrumentUniverse};
use crate::exchanges::binance::WS_URL;
use crate::rest::DEFAULT_SECONDARY_URL;
use crate::transport::SupervisorSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration
///
/// Loaded from config.toml at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Upstream endpoints
    #[serde(default)]
    pub feed: FeedConfig,

    /// Reconnect, failover and polling policy
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub mapper: MapperConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    /// API server settings
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Instrument universe in canonical order; empty means the built-in set
    #[serde(default)]
    pub instruments: Vec<InstrumentSpec>,

    /// Rules seeded into the in-memory alert repository
    #[serde(default)]
    pub alert_rules: Vec<AlertRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base for ticker polling and the catalog
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    #[serde(default = "default_secondary_url")]
    pub secondary_url: String,

    /// Per-request timeout for REST calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_max_stream_attempts")]
    pub max_stream_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Bound on connect plus first tick
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Silence on an open stream longer than this is an abnormal close
    #[serde(default = "default_stream_idle_timeout_ms")]
    pub stream_idle_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_secondary_interval_ms")]
    pub secondary_interval_ms: u64,

    /// 0 disables stream probes while polling
    #[serde(default = "default_stream_probe_interval_ms")]
    pub stream_probe_interval_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapperConfig {
    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,

    #[serde(default = "default_catalog_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default)]
    pub initial_page: usize,

    /// Currency requested from the secondary source
    #[serde(default = "default_display_currency")]
    pub display_currency: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_alert_interval_ms")]
    pub interval_ms: u64,

    /// Events are POSTed here when set, otherwise only logged
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_host")]
    pub host: String,

    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// EnvFilter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_true")]
    pub console: bool,
}

/// `[[alert_rules]]` entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertRuleConfig {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub owner: String,
    pub instrument_id: InstrumentId,
    pub target_price: FixedPoint8,
    pub direction: Direction,
    #[serde(default)]
    pub recurring: bool,
}

impl AlertRuleConfig {
    pub fn to_rule(&self) -> AlertRule {
        let mut rule = AlertRule::new(
            &self.owner,
            self.instrument_id.clone(),
            self.target_price,
            self.direction,
            self.recurring,
        );
        if let Some(id) = &self.id {
            rule.id = RuleId::new(id.clone());
        }
        rule
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            rest_url: default_rest_url(),
            secondary_url: default_secondary_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_stream_attempts: default_max_stream_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            stream_idle_timeout_ms: default_stream_idle_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            secondary_interval_ms: default_secondary_interval_ms(),
            stream_probe_interval_ms: default_stream_probe_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            catalog_ttl_secs: default_catalog_ttl_secs(),
            fetch_timeout_ms: default_catalog_fetch_timeout_ms(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            initial_page: 0,
            display_currency: default_display_currency(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_alert_interval_ms(),
            webhook_url: None,
            webhook_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
            console: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ws_url() -> String {
    WS_URL.to_string()
}

fn default_rest_url() -> String {
    DEFAULT_REST_URL.to_string()
}

fn default_secondary_url() -> String {
    DEFAULT_SECONDARY_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_stream_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ping_interval_ms() -> u64 {
    20_000
}

fn default_stream_idle_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_secondary_interval_ms() -> u64 {
    15_000
}

fn default_stream_probe_interval_ms() -> u64 {
    60_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_stop_grace_ms() -> u64 {
    2_000
}

fn default_catalog_ttl_secs() -> u64 {
    3_600 // 1 hour
}

fn default_catalog_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_page_size() -> usize {
    10
}

fn default_display_currency() -> String {
    "usd".to_string()
}

fn default_alert_interval_ms() -> u64 {
    4_000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the file named by `CONFIG_PATH`
    /// (default config.toml)
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be read, parsed or validated.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.engine.page_size == 0 {
            return invalid("engine.page_size must be positive");
        }
        if self.supervisor.max_stream_attempts == 0 {
            return invalid("supervisor.max_stream_attempts must be positive");
        }
        for (name, value) in [
            ("supervisor.poll_interval_ms", self.supervisor.poll_interval_ms),
            ("supervisor.secondary_interval_ms", self.supervisor.secondary_interval_ms),
            ("supervisor.connect_timeout_ms", self.supervisor.connect_timeout_ms),
            ("supervisor.ping_interval_ms", self.supervisor.ping_interval_ms),
            ("supervisor.stream_idle_timeout_ms", self.supervisor.stream_idle_timeout_ms),
            ("supervisor.backoff_base_ms", self.supervisor.backoff_base_ms),
            ("feed.request_timeout_ms", self.feed.request_timeout_ms),
            ("alerts.interval_ms", self.alerts.interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.supervisor.backoff_cap_ms < self.supervisor.backoff_base_ms {
            return invalid("supervisor.backoff_cap_ms below backoff_base_ms");
        }

        let mut seen = HashSet::new();
        for spec in &self.instruments {
            if !seen.insert(&spec.id) {
                return Err(ConfigError::Invalid(format!("duplicate instrument id {}", spec.id)));
            }
        }

        let page_count = self.universe().page_count(self.engine.page_size);
        if self.engine.initial_page >= page_count {
            return Err(ConfigError::Invalid(format!(
                "engine.initial_page {} out of range ({} pages)",
                self.engine.initial_page, page_count
            )));
        }
        Ok(())
    }

    /// Configured universe, or the built-in one
    pub fn universe(&self) -> InstrumentUniverse {
        if self.instruments.is_empty() {
            InstrumentUniverse::default_set()
        } else {
            InstrumentUniverse::new(self.instruments.clone())
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        let s = &self.supervisor;
        SupervisorSettings {
            max_stream_attempts: s.max_stream_attempts,
            backoff_base: Duration::from_millis(s.backoff_base_ms),
            backoff_cap: Duration::from_millis(s.backoff_cap_ms),
            connect_timeout: Duration::from_millis(s.connect_timeout_ms),
            poll_interval: Duration::from_millis(s.poll_interval_ms),
            request_timeout: self.request_timeout(),
            secondary_interval: Duration::from_millis(s.secondary_interval_ms),
            secondary_currency: self.engine.display_currency.to_ascii_lowercase(),
            stream_probe_interval: Duration::from_millis(s.stream_probe_interval_ms),
            reconnect_delay: Duration::from_millis(s.reconnect_delay_ms),
            stop_grace: Duration::from_millis(s.stop_grace_ms),
        }
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.feed.request_timeout_ms)
    }

    pub fn alert_rules(&self) -> Vec<AlertRule> {
        self.alert_rules.iter().map(AlertRuleConfig::to_rule).collect()
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::SyncError {
    fn from(e: ConfigError) -> Self {
        crate::SyncError::Config(e.to_string())
    }
}

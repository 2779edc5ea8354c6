//! Threshold price alerts
//!
//! Rules live in an external repository and fire through an external
//! notifier; this module owns only the evaluation watermark and the cadence
//! loop that drives it.

pub mod dispatch;
pub mod evaluator;
pub mod monitor;

use crate::core::{FixedPoint8, InstrumentId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub use dispatch::{InMemoryAlertRepository, LogNotifier, WebhookNotifier};
pub use evaluator::{tick, tick_at};
pub use monitor::AlertMonitor;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Inclusive threshold test
    #[inline]
    pub fn crossed(&self, price: FixedPoint8, target: FixedPoint8) -> bool {
        match self {
            Direction::Above => price >= target,
            Direction::Below => price <= target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: RuleId,
    /// Recipient handed to the notifier
    pub owner: String,
    pub instrument_id: InstrumentId,
    pub target_price: FixedPoint8,
    pub direction: Direction,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Last price this rule was evaluated at; written only by the evaluator
    #[serde(default)]
    pub last_evaluated_price: Option<FixedPoint8>,
}

fn default_active() -> bool {
    true
}

impl AlertRule {
    pub fn new(
        owner: &str,
        instrument_id: InstrumentId,
        target_price: FixedPoint8,
        direction: Direction,
        recurring: bool,
    ) -> Self {
        Self {
            id: RuleId::generate(),
            owner: owner.to_string(),
            instrument_id,
            target_price,
            direction,
            recurring,
            active: true,
            last_evaluated_price: None,
        }
    }
}

/// One qualifying transition of one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub rule_id: RuleId,
    pub owner: String,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub target_price: FixedPoint8,
    pub recurring: bool,
    pub price: FixedPoint8,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TriggerEvent {
    pub fn describe(&self) -> String {
        let side = match self.direction {
            Direction::Above => "at or above",
            Direction::Below => "at or below",
        };
        format!(
            "{} {} {} (now {})",
            self.instrument_id, side, self.target_price, self.price
        )
    }
}

/// Rule persistence collaborator
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn list_active_rules(&self) -> anyhow::Result<Vec<AlertRule>>;

    /// Record a fire; non-recurring rules become inactive
    async fn mark_triggered(&self, event: &TriggerEvent) -> anyhow::Result<()>;
}

/// Outbound delivery collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, event: &TriggerEvent) -> anyhow::Result<()>;
}

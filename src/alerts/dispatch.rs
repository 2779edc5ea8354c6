//! Alert collaborators shipped with the engine
//!
//! `InMemoryAlertRepository` is seeded from config and stands in for a real
//! rule store. `WebhookNotifier` posts each event as JSON; `LogNotifier`
//! only logs.

use crate::alerts::{AlertRepository, AlertRule, Notifier, RuleId, TriggerEvent};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use std::time::Duration;

#[derive(Default)]
pub struct InMemoryAlertRepository {
    rules: RwLock<Vec<AlertRule>>,
    triggered: RwLock<Vec<TriggerEvent>>,
}

impl InMemoryAlertRepository {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            triggered: RwLock::new(Vec::new()),
        }
    }

    pub fn add_rule(&self, rule: AlertRule) {
        self.rules.write().push(rule);
    }

    pub fn remove_rule(&self, id: &RuleId) {
        self.rules.write().retain(|r| &r.id != id);
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().clone()
    }

    pub fn triggered(&self) -> Vec<TriggerEvent> {
        self.triggered.read().clone()
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn list_active_rules(&self) -> anyhow::Result<Vec<AlertRule>> {
        Ok(self.rules.read().iter().filter(|r| r.active).cloned().collect())
    }

    async fn mark_triggered(&self, event: &TriggerEvent) -> anyhow::Result<()> {
        if !event.recurring {
            let mut rules = self.rules.write();
            let rule = rules
                .iter_mut()
                .find(|r| r.id == event.rule_id)
                .with_context(|| format!("unknown rule {}", event.rule_id))?;
            rule.active = false;
        }
        self.triggered.write().push(event.clone());
        Ok(())
    }
}

/// Logs each event on the alerts target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, event: &TriggerEvent) -> anyhow::Result<()> {
        crate::log_alerts!(
            tracing::Level::INFO,
            "Alert {} for {}: {}",
            event.rule_id,
            recipient,
            event.describe()
        );
        Ok(())
    }
}

/// POSTs `{"recipient", "message", "event"}` to a webhook
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("market-sync/0.1")
            .build()
            .context("building webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, recipient: &str, event: &TriggerEvent) -> anyhow::Result<()> {
        let payload = json!({
            "recipient": recipient,
            "message": event.describe(),
            "event": event,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("sending alert webhook")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("alert webhook returned {}", status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Direction;
    use crate::test_utils::price;
    use time::OffsetDateTime;

    fn event_for(rule: &AlertRule) -> TriggerEvent {
        TriggerEvent {
            rule_id: rule.id.clone(),
            owner: rule.owner.clone(),
            instrument_id: rule.instrument_id.clone(),
            direction: rule.direction,
            target_price: rule.target_price,
            recurring: rule.recurring,
            price: price(101),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn test_mark_triggered_deactivates_one_shot() {
        let one_shot = AlertRule::new("ops", "bitcoin".into(), price(100), Direction::Above, false);
        let recurring = AlertRule::new("ops", "bitcoin".into(), price(100), Direction::Above, true);
        let repo = InMemoryAlertRepository::new(vec![one_shot.clone(), recurring.clone()]);

        repo.mark_triggered(&event_for(&one_shot)).await.unwrap();
        repo.mark_triggered(&event_for(&recurring)).await.unwrap();

        let active = repo.list_active_rules().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, recurring.id);
        assert_eq!(repo.triggered().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_unknown_one_shot_fails() {
        let repo = InMemoryAlertRepository::default();
        let ghost = AlertRule::new("ops", "bitcoin".into(), price(1), Direction::Below, false);
        assert!(repo.mark_triggered(&event_for(&ghost)).await.is_err());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let rule = AlertRule::new("ops", "bitcoin".into(), price(100), Direction::Above, true);
        assert!(LogNotifier.notify("ops", &event_for(&rule)).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_secs(1)).unwrap();
        let rule = AlertRule::new("ops", "bitcoin".into(), price(100), Direction::Above, true);
        assert!(notifier.notify("ops", &event_for(&rule)).await.is_err());
    }

    #[test]
    fn test_event_payload_shape() {
        let rule = AlertRule::new("ops", "bitcoin".into(), price(100), Direction::Above, true);
        let json = serde_json::to_value(event_for(&rule)).unwrap();
        assert_eq!(json["instrumentId"], "bitcoin");
        assert_eq!(json["direction"], "above");
        assert_eq!(json["price"], 101.0);
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    }
}

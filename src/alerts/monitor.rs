//! Cadence loop driving the evaluator
//!
//! Every cycle lists active rules, merges them with the local view (so
//! watermarks and local deactivations survive), evaluates against a store
//! snapshot, records each event in the repository and hands it to the
//! notifier on a background task so a slow recipient never stalls a cycle.
//! Delivery failures are logged and counted; they never undo a watermark.

use crate::alerts::evaluator::tick;
use crate::alerts::{AlertRepository, AlertRule, Notifier, RuleId, TriggerEvent};
use crate::hot_path::PriceStore;
use crate::infrastructure::metrics::MetricsCollector;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

/// Default evaluation cadence
pub const DEFAULT_ALERT_INTERVAL: Duration = Duration::from_secs(4);

pub struct AlertMonitor {
    repository: Arc<dyn AlertRepository>,
    notifier: Arc<dyn Notifier>,
    store: Arc<PriceStore>,
    metrics: Arc<MetricsCollector>,
    cadence: Duration,
    rules: Vec<AlertRule>,
    /// One-shot rules fired here that the repository may still list
    retired: HashSet<RuleId>,
    /// Notifications still in flight
    deliveries: JoinSet<()>,
}

/// Resolves once `shutdown` is raised (or its sender is gone)
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl AlertMonitor {
    pub fn new(
        repository: Arc<dyn AlertRepository>,
        notifier: Arc<dyn Notifier>,
        store: Arc<PriceStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            repository,
            notifier,
            store,
            metrics,
            cadence: DEFAULT_ALERT_INTERVAL,
            rules: Vec::new(),
            retired: HashSet::new(),
            deliveries: JoinSet::new(),
        }
    }

    pub fn with_interval(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Current local view of the rules
    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    fn merge(&mut self, listed: Vec<AlertRule>) {
        let mut previous: HashMap<RuleId, AlertRule> =
            self.rules.drain(..).map(|r| (r.id.clone(), r)).collect();

        self.rules = listed
            .into_iter()
            .map(|mut rule| {
                if let Some(old) = previous.remove(&rule.id) {
                    rule.last_evaluated_price = old.last_evaluated_price;
                }
                if self.retired.contains(&rule.id) {
                    rule.active = false;
                }
                rule
            })
            .collect();

        let listed_ids: HashSet<&RuleId> = self.rules.iter().map(|r| &r.id).collect();
        self.retired.retain(|id| listed_ids.contains(id));
    }

    /// Wait for every notification handed out so far
    pub async fn flush_deliveries(&mut self) {
        while self.deliveries.join_next().await.is_some() {}
    }

    fn deliver(&mut self, event: TriggerEvent) {
        let notifier = Arc::clone(&self.notifier);
        let metrics = Arc::clone(&self.metrics);
        self.deliveries.spawn(async move {
            if let Err(e) = notifier.notify(&event.owner, &event).await {
                metrics.record_delivery_failure();
                crate::log_alerts!(tracing::Level::WARN, "Notify failed for rule {}: {:#}", event.rule_id, e);
            }
        });
    }

    /// One evaluation cycle; returns the number of events fired
    pub async fn run_once(&mut self) -> usize {
        while self.deliveries.try_join_next().is_some() {}

        match self.repository.list_active_rules().await {
            Ok(listed) => self.merge(listed),
            Err(e) => {
                crate::log_alerts!(
                    tracing::Level::WARN,
                    "Listing rules failed, evaluating {} cached rules: {:#}",
                    self.rules.len(),
                    e
                );
            }
        }

        let snapshot = self.store.snapshot();
        let events = tick(&mut self.rules, &snapshot);

        let fired = events.len();
        for event in events {
            self.metrics.record_alert_fired();
            if !event.recurring {
                self.retired.insert(event.rule_id.clone());
            }
            crate::log_alerts!(
                tracing::Level::INFO,
                "Rule {} fired: {}",
                event.rule_id,
                event.describe()
            );

            if let Err(e) = self.repository.mark_triggered(&event).await {
                self.metrics.record_delivery_failure();
                crate::log_alerts!(
                    tracing::Level::WARN,
                    "Recording trigger failed for rule {}: {:#}",
                    event.rule_id,
                    e
                );
            }
            self.deliver(event);
        }

        fired
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut cadence = interval(self.cadence);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        crate::log_alerts!(tracing::Level::INFO, "Alert monitor running every {:?}", self.cadence);

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = cadence.tick() => {
                    self.run_once().await;
                }
            }
        }

        self.flush_deliveries().await;
        crate::log_alerts!(tracing::Level::INFO, "Alert monitor stopped");
    }
}

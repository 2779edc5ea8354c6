//! Connection state owned by the supervisor
//!
//! Published through a `watch` channel: readers get cheap snapshots or wait
//! for transitions, and only the supervisor's sessions write.

use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Connecting,
    Streaming,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Streaming,
    Polling,
}

/// Snapshot of the supervisor's state machine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub phase: Phase,
    /// Meaningful with `Connecting`: which transport is being opened
    pub transport: TransportKind,
    /// Reconnect attempts since the last successful tick
    pub attempt: u32,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update_at: Option<OffsetDateTime>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            transport: TransportKind::Streaming,
            attempt: 0,
            last_error: None,
            last_update_at: None,
        }
    }
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Streaming | Phase::Polling)
    }
}

/// `min(base * 2^attempt, cap)`
pub fn backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |d| d.min(cap))
}

/// Writer side of the state channel
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply `f`; receivers are woken only if something changed
    pub fn update<F: FnOnce(&mut ConnectionState)>(&self, f: F) {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub fn connecting(&self, transport: TransportKind, attempt: u32) {
        self.update(|s| {
            s.phase = Phase::Connecting;
            s.transport = transport;
            s.attempt = attempt;
        });
    }

    pub fn streaming(&self) {
        self.update(|s| {
            s.phase = Phase::Streaming;
            s.transport = TransportKind::Streaming;
            s.attempt = 0;
            s.last_error = None;
        });
    }

    pub fn polling(&self) {
        self.update(|s| {
            s.phase = Phase::Polling;
            s.transport = TransportKind::Polling;
        });
    }

    /// Teardown (and upstream clean close): no error, no attempts
    pub fn stopped(&self) {
        self.update(|s| {
            s.phase = Phase::Stopped;
            s.attempt = 0;
            s.last_error = None;
        });
    }

    pub fn failed(&self, error: String) {
        self.update(|s| s.last_error = Some(error));
    }

    /// Any tick resets the attempt counter; a fresh one also clears the
    /// last error and moves `last_update_at`
    pub fn on_tick(&self, fresh: bool) {
        self.update(|s| {
            s.attempt = 0;
            if fresh {
                s.last_error = None;
                s.last_update_at = Some(OffsetDateTime::now_utc());
            }
        });
    }

    /// Secondary-source update: freshness only, transport state untouched
    pub fn touched(&self) {
        self.update(|s| s.last_update_at = Some(OffsetDateTime::now_utc()));
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

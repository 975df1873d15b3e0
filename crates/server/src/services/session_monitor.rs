//! Idle-session watchdog.
//!
//! Every login gets a [`SessionToken`] registered in the [`SessionRegistry`]
//! together with its last-activity instant. Requests touch the token; the
//! [`SessionMonitor`] task sweeps the registry on a fixed interval, warns once
//! when a session is about to time out and force-expires idle ones.
//!
//! # Timing rules
//!
//! - A session expires when its idle time is strictly greater than `idle_timeout`.
//! - A warning fires when remaining time drops strictly below `warning_threshold`,
//!   at most once per idle period. Activity re-arms it.
//!
//! Instants come from `tokio::time`, so tests can drive the clock with
//! `tokio::time::pause`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use sqlx::SqlitePool;
use uuid::Uuid;

use crave_core::UserId;

use crate::config::SessionConfig;
use crate::db::AuditRepository;
use crate::models::audit::actions;
use crate::services::verification::VerificationCodes;

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Opaque identifier of one logged-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: UserId,
    created_at: Instant,
    last_activity: Instant,
    warned: bool,
}

/// Snapshot of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Idle time left before forced logout.
    #[serde(serialize_with = "serialize_secs", rename = "remaining_secs")]
    pub remaining: Duration,
    /// Whether the remaining time is inside the warning threshold.
    pub warning: bool,
    /// Time since login.
    #[serde(serialize_with = "serialize_secs", rename = "age_secs")]
    pub age: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// The token is unknown or idled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session expired")]
pub struct SessionExpired;

/// Emitted by the watchdog sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session will time out soon.
    Warning {
        token: SessionToken,
        user_id: UserId,
        remaining: Duration,
    },
    /// The session idled out and was removed.
    Expired {
        token: SessionToken,
        user_id: UserId,
        idle: Duration,
    },
}

/// Live sessions and their last activity. Clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionToken, SessionEntry>>>,
    config: SessionConfig,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    fn state_of(&self, entry: &SessionEntry, now: Instant) -> SessionState {
        let idle = now.saturating_duration_since(entry.last_activity);
        let remaining = self.config.idle_timeout.saturating_sub(idle);
        SessionState {
            remaining,
            warning: remaining < self.config.warning_threshold,
            age: now.saturating_duration_since(entry.created_at),
        }
    }

    fn is_idle_out(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_activity) > self.config.idle_timeout
    }

    /// Register a new session for `user_id`.
    pub async fn start(&self, user_id: UserId) -> SessionToken {
        let token = SessionToken::generate();
        let now = Instant::now();
        self.sessions.lock().await.insert(
            token,
            SessionEntry {
                user_id,
                created_at: now,
                last_activity: now,
                warned: false,
            },
        );
        tracing::debug!(%token, user_id = %user_id, "Session started");
        token
    }

    /// Record activity on a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` if the token is unknown or already past the
    /// idle timeout (in which case it is removed).
    pub async fn touch(&self, token: SessionToken) -> Result<SessionState, SessionExpired> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.get_mut(&token) else {
            return Err(SessionExpired);
        };
        if self.is_idle_out(entry, now) {
            sessions.remove(&token);
            return Err(SessionExpired);
        }
        entry.last_activity = now;
        entry.warned = false;
        Ok(self.state_of(entry, now))
    }

    /// Current state of a session without recording activity.
    pub async fn status(&self, token: SessionToken) -> Option<SessionState> {
        let now = Instant::now();
        let sessions = self.sessions.lock().await;
        sessions
            .get(&token)
            .filter(|entry| !self.is_idle_out(entry, now))
            .map(|entry| self.state_of(entry, now))
    }

    /// Remove a session. Returns whether it was live.
    pub async fn end(&self, token: SessionToken) -> bool {
        self.sessions.lock().await.remove(&token).is_some()
    }

    /// Remove every session of a user. Returns how many were removed.
    pub async fn end_all_for_user(&self, user_id: UserId) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.user_id != user_id);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(user_id = %user_id, removed, "Revoked user sessions");
        }
        removed
    }

    /// Remove every session of a user except `keep`. Returns how many were removed.
    pub async fn end_others_for_user(&self, user_id: UserId, keep: SessionToken) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|token, entry| entry.user_id != user_id || *token == keep);
        before - sessions.len()
    }

    /// Number of registered sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Sweep all sessions at `now`: remove idle ones and flag those about to expire.
    pub async fn evaluate(&self, now: Instant) -> Vec<SessionEvent> {
        let mut sessions = self.sessions.lock().await;
        let mut events = Vec::new();

        sessions.retain(|token, entry| {
            let idle = now.saturating_duration_since(entry.last_activity);
            if idle > self.config.idle_timeout {
                events.push(SessionEvent::Expired {
                    token: *token,
                    user_id: entry.user_id,
                    idle,
                });
                return false;
            }

            let remaining = self.config.idle_timeout - idle;
            if remaining < self.config.warning_threshold && !entry.warned {
                entry.warned = true;
                events.push(SessionEvent::Warning {
                    token: *token,
                    user_id: entry.user_id,
                    remaining,
                });
            }
            true
        });

        events
    }
}

/// Handle to the background sweep task.
pub struct SessionMonitor {
    events: broadcast::Sender<SessionEvent>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionMonitor {
    /// Spawn the sweep on the current runtime.
    ///
    /// Each tick evaluates the registry, publishes the resulting events and
    /// purges expired verification codes. Missed ticks are skipped rather than
    /// replayed in a burst.
    #[must_use]
    pub fn spawn(registry: SessionRegistry, codes: VerificationCodes, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let tx = events.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(interval_secs = interval.as_secs(), "Session monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for event in registry.evaluate(Instant::now()).await {
                            // No subscribers is fine; events are advisory.
                            let _ = tx.send(event);
                        }
                        let purged = codes.purge_expired(Utc::now()).await;
                        if purged > 0 {
                            tracing::debug!(purged, "Purged expired verification codes");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Session monitor stopped");
        });

        Self {
            events,
            shutdown,
            handle,
        }
    }

    /// Receive events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Flip the shutdown flag and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Session monitor task failed");
        }
    }
}

/// Log watchdog events and record forced logouts in the audit trail.
///
/// Runs until the monitor drops its sender. A lagging receiver logs how many
/// events it missed and carries on.
pub async fn audit_session_events(mut events: broadcast::Receiver<SessionEvent>, pool: SqlitePool) {
    let audit = AuditRepository::new(&pool);
    loop {
        match events.recv().await {
            Ok(SessionEvent::Warning {
                user_id, remaining, ..
            }) => {
                tracing::info!(user_id = %user_id, remaining_secs = remaining.as_secs(), "Session about to expire");
            }
            Ok(SessionEvent::Expired { user_id, idle, .. }) => {
                tracing::info!(user_id = %user_id, idle_secs = idle.as_secs(), "Session expired, user logged out");
                let details = format!("idle_secs={}", idle.as_secs());
                if let Err(e) = audit
                    .record(Some(user_id), actions::SESSION_EXPIRED, &details)
                    .await
                {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to audit session expiry");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Session event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::VerificationConfig;

    fn config() -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(60),
            warning_threshold: Duration::from_secs(10),
            check_interval: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_keeps_session_alive() {
        let registry = SessionRegistry::new(config());
        let token = registry.start(UserId::new(1)).await;

        tokio::time::advance(Duration::from_secs(50)).await;
        let state = registry.touch(token).await.unwrap();
        assert_eq!(state.remaining, Duration::from_secs(60));
        assert!(!state.warning);

        tokio::time::advance(Duration::from_secs(55)).await;
        assert!(registry.touch(token).await.is_ok());
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_after_timeout_expires() {
        let registry = SessionRegistry::new(config());
        let token = registry.start(UserId::new(1)).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(registry.status(token).await.is_none());
        assert_eq!(registry.touch(token).await, Err(SessionExpired));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_warning() {
        let registry = SessionRegistry::new(config());
        let token = registry.start(UserId::new(1)).await;

        tokio::time::advance(Duration::from_secs(45)).await;
        let state = registry.status(token).await.unwrap();
        assert_eq!(state.remaining, Duration::from_secs(15));
        assert!(!state.warning);

        tokio::time::advance(Duration::from_secs(6)).await;
        let state = registry.status(token).await.unwrap();
        assert!(state.warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_warns_once_then_expires() {
        let registry = SessionRegistry::new(config());
        let token = registry.start(UserId::new(7)).await;
        let start = Instant::now();

        assert!(registry.evaluate(start + Duration::from_secs(50)).await.is_empty());

        let events = registry.evaluate(start + Duration::from_secs(55)).await;
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::Warning { remaining, .. }] if *remaining == Duration::from_secs(5)
        ));
        assert!(registry.evaluate(start + Duration::from_secs(58)).await.is_empty());

        // Exactly at the timeout the session is still alive.
        assert!(registry.evaluate(start + Duration::from_secs(60)).await.is_empty());

        let events = registry.evaluate(start + Duration::from_secs(61)).await;
        assert_eq!(
            events,
            vec![SessionEvent::Expired {
                token,
                user_id: UserId::new(7),
                idle: Duration::from_secs(61),
            }]
        );
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_all_for_user() {
        let registry = SessionRegistry::new(config());
        let a = registry.start(UserId::new(1)).await;
        registry.start(UserId::new(1)).await;
        let other = registry.start(UserId::new(2)).await;

        assert_eq!(registry.end_all_for_user(UserId::new(1)).await, 2);
        assert!(registry.status(a).await.is_none());
        assert!(registry.status(other).await.is_some());
        assert!(registry.end(other).await);
        assert!(!registry.end(other).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_others_keeps_current() {
        let registry = SessionRegistry::new(config());
        let current = registry.start(UserId::new(1)).await;
        let stale = registry.start(UserId::new(1)).await;
        let other = registry.start(UserId::new(2)).await;

        assert_eq!(registry.end_others_for_user(UserId::new(1), current).await, 1);
        assert!(registry.status(current).await.is_some());
        assert!(registry.status(stale).await.is_none());
        assert!(registry.status(other).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_events_and_stops() {
        let registry = SessionRegistry::new(config());
        let codes = VerificationCodes::new(VerificationConfig::default());
        let monitor = SessionMonitor::spawn(registry.clone(), codes, Duration::from_secs(5));
        let mut events = monitor.subscribe();

        let token = registry.start(UserId::new(3)).await;

        let first = events.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::Warning { token: t, .. } if t == token));

        let second = events.recv().await.unwrap();
        assert!(matches!(second, SessionEvent::Expired { token: t, .. } if t == token));
        assert_eq!(registry.active_count().await, 0);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_expired_events_are_audited() {
        let pool = crate::db::create_memory_pool().await.unwrap();
        let user = crate::db::users::tests::insert_user(&pool, "idle@example.com", crave_core::UserRole::Customer).await;

        let (tx, rx) = broadcast::channel(8);
        tx.send(SessionEvent::Warning {
            token: SessionToken::generate(),
            user_id: user.id,
            remaining: Duration::from_secs(5),
        })
        .unwrap();
        tx.send(SessionEvent::Expired {
            token: SessionToken::generate(),
            user_id: user.id,
            idle: Duration::from_secs(61),
        })
        .unwrap();
        drop(tx);

        audit_session_events(rx, pool.clone()).await;

        let entries = AuditRepository::new(&pool)
            .recent(Some(user.id), None)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, actions::SESSION_EXPIRED);
        assert_eq!(entries[0].details, "idle_secs=61");
    }
}

//! Playback session lifecycle: lazy activation on first observed playback,
//! TTL-driven sweeps, terminal stickiness.

use crate::metrics::SESSION_SWEEPS_TOTAL;
use crate::state::AppState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::sessions::{EndReason, SessionFilter, SessionRecord, SessionStatus, SweepOutcome};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    tenant_id: String,
    camera_id: String,
    sid: String,
}

/// Refusal signal for playback against a terminal session. The HTTP surface
/// translates it to `PLAYBACK_SESSION_CLOSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

pub struct SessionManager {
    inner: RwLock<HashMap<SessionKey, SessionRecord>>,
    idle_ttl: ChronoDuration,
}

impl SessionManager {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            idle_ttl: ChronoDuration::from_std(idle_ttl).unwrap_or(ChronoDuration::MAX),
        }
    }

    /// Record a playback observation for `sid` after token verification.
    ///
    /// An unknown sid creates the session directly in `active` (the data
    /// plane first sees a session when it serves traffic). A live session is
    /// refreshed; a terminal one is refused and stays terminal even while the
    /// token's `exp` is still in the future.
    pub async fn observe(
        &self,
        tenant_id: &str,
        camera_id: &str,
        sid: &str,
        sub: &str,
        issued_at_epoch: u64,
        expires_at_epoch: u64,
    ) -> Result<SessionRecord, SessionClosed> {
        let key = SessionKey {
            tenant_id: tenant_id.to_string(),
            camera_id: camera_id.to_string(),
            sid: sid.to_string(),
        };
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        match inner.get_mut(&key) {
            None => {
                let record = SessionRecord {
                    tenant_id: key.tenant_id.clone(),
                    camera_id: key.camera_id.clone(),
                    sid: key.sid.clone(),
                    sub: sub.to_string(),
                    status: SessionStatus::Active,
                    issued_at: epoch_to_datetime(issued_at_epoch, now),
                    activated_at: Some(now),
                    ended_at: None,
                    expires_at: epoch_to_datetime(expires_at_epoch, now),
                    last_seen_at: now,
                    end_reason: None,
                };
                debug!(tenant_id, camera_id, sid, "session activated");
                inner.insert(key, record.clone());
                Ok(record)
            }
            Some(record) if record.status.is_terminal() => Err(SessionClosed),
            Some(record) => {
                if record.status == SessionStatus::Issued {
                    record.status = SessionStatus::Active;
                    record.activated_at = Some(now);
                }
                record.last_seen_at = now;
                Ok(record.clone())
            }
        }
    }

    /// One sweep pass at the current wall time.
    pub async fn sweep(&self) -> SweepOutcome {
        self.sweep_at(Utc::now()).await
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut inner = self.inner.write().await;
        for record in inner.values_mut() {
            if record.status.is_terminal() {
                continue;
            }
            if record.expires_at <= now {
                record.status = SessionStatus::Expired;
                record.ended_at = Some(now);
                record.end_reason = Some(EndReason::TokenExpired);
                outcome.expired += 1;
            } else if record.status == SessionStatus::Active
                && now - record.last_seen_at > self.idle_ttl
            {
                record.status = SessionStatus::Ended;
                record.ended_at = Some(now);
                record.end_reason = Some(EndReason::IdleTimeout);
                outcome.ended += 1;
            }
        }
        drop(inner);

        SESSION_SWEEPS_TOTAL.inc();
        if outcome.expired > 0 || outcome.ended > 0 {
            info!(
                expired = outcome.expired,
                ended = outcome.ended,
                "session sweep"
            );
        }
        outcome
    }

    /// End every non-terminal session of one stream, e.g. on deprovision.
    /// Returns how many sessions were closed.
    pub async fn close_for_stream(
        &self,
        tenant_id: &str,
        camera_id: &str,
        reason: EndReason,
    ) -> u64 {
        let now = Utc::now();
        let mut closed = 0;
        let mut inner = self.inner.write().await;
        for record in inner.values_mut() {
            if record.tenant_id == tenant_id
                && record.camera_id == camera_id
                && !record.status.is_terminal()
            {
                record.status = SessionStatus::Ended;
                record.ended_at = Some(now);
                record.end_reason = Some(reason);
                closed += 1;
            }
        }
        closed
    }

    /// Sessions matching the filter, most recently seen first.
    pub async fn list(&self, filter: &SessionFilter) -> Vec<SessionRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<SessionRecord> = inner
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        records
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn counts_by_status(&self) -> HashMap<SessionStatus, i64> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for record in inner.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }
}

fn epoch_to_datetime(epoch_secs: u64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(epoch_secs as i64, 0).unwrap_or(fallback)
}

/// Background sweep at the configured interval, until aborted on shutdown.
pub async fn run_sweep_loop(state: AppState) {
    let interval = state.config().session_sweep_interval;
    loop {
        sleep(interval).await;
        state.sessions().sweep().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(idle_ttl: Duration) -> SessionManager {
        SessionManager::new(idle_ttl)
    }

    fn epoch(dt: DateTime<Utc>) -> u64 {
        dt.timestamp().max(0) as u64
    }

    #[tokio::test]
    async fn first_observation_activates() {
        let mgr = manager(Duration::from_secs(60));
        let now = Utc::now();
        let record = mgr
            .observe(
                "tenant-a",
                "camera-a",
                "sid-1",
                "viewer-1",
                epoch(now),
                epoch(now + ChronoDuration::seconds(60)),
            )
            .await
            .unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert!(record.activated_at.is_some());
        assert_eq!(record.sub, "viewer-1");
    }

    #[tokio::test]
    async fn repeat_observation_refreshes_last_seen() {
        let mgr = manager(Duration::from_secs(60));
        let now = Utc::now();
        let exp = epoch(now + ChronoDuration::seconds(60));
        let first = mgr
            .observe("tenant-a", "camera-a", "sid-1", "viewer-1", epoch(now), exp)
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        let second = mgr
            .observe("tenant-a", "camera-a", "sid-1", "viewer-1", epoch(now), exp)
            .await
            .unwrap();
        assert!(second.last_seen_at > first.last_seen_at);
        assert_eq!(mgr.len().await, 1);
    }

    #[tokio::test]
    async fn sweep_expires_by_token_exp() {
        let mgr = manager(Duration::from_secs(60));
        let now = Utc::now();
        mgr.observe(
            "tenant-a",
            "camera-a",
            "sid-expiring",
            "viewer-1",
            epoch(now),
            epoch(now + ChronoDuration::seconds(30)),
        )
        .await
        .unwrap();

        // Not yet expired at +29s.
        let outcome = mgr.sweep_at(now + ChronoDuration::seconds(29)).await;
        assert_eq!(outcome, SweepOutcome::default());

        // Expired exactly at exp.
        let outcome = mgr.sweep_at(now + ChronoDuration::seconds(30)).await;
        assert_eq!(outcome.expired, 1);
        assert_eq!(outcome.ended, 0);

        let records = mgr.list(&SessionFilter::default()).await;
        assert_eq!(records[0].status, SessionStatus::Expired);
        assert_eq!(records[0].end_reason, Some(EndReason::TokenExpired));
        assert!(records[0].ended_at.is_some());
    }

    #[tokio::test]
    async fn sweep_ends_idle_sessions() {
        let mgr = manager(Duration::from_secs(10));
        let now = Utc::now();
        mgr.observe(
            "tenant-a",
            "camera-a",
            "sid-idle",
            "viewer-1",
            epoch(now),
            epoch(now + ChronoDuration::seconds(600)),
        )
        .await
        .unwrap();

        // Within the idle ttl nothing happens.
        let outcome = mgr.sweep_at(now + ChronoDuration::seconds(10)).await;
        assert_eq!(outcome, SweepOutcome::default());

        let outcome = mgr.sweep_at(now + ChronoDuration::seconds(11)).await;
        assert_eq!(outcome.ended, 1);
        assert_eq!(outcome.expired, 0);

        let records = mgr.list(&SessionFilter::default()).await;
        assert_eq!(records[0].status, SessionStatus::Ended);
        assert_eq!(records[0].end_reason, Some(EndReason::IdleTimeout));
    }

    #[tokio::test]
    async fn terminal_sessions_refuse_playback() {
        let mgr = manager(Duration::from_secs(60));
        let now = Utc::now();
        let exp = epoch(now + ChronoDuration::seconds(3600));
        mgr.observe("tenant-a", "camera-a", "sid-1", "viewer-1", epoch(now), exp)
            .await
            .unwrap();
        mgr.close_for_stream("tenant-a", "camera-a", EndReason::Deprovisioned)
            .await;

        // Token still valid by exp, session is gone for good.
        let refused = mgr
            .observe("tenant-a", "camera-a", "sid-1", "viewer-1", epoch(now), exp)
            .await;
        assert_eq!(refused, Err(SessionClosed));
    }

    #[tokio::test]
    async fn close_for_stream_scopes_to_one_stream() {
        let mgr = manager(Duration::from_secs(60));
        let now = Utc::now();
        let exp = epoch(now + ChronoDuration::seconds(600));
        mgr.observe("tenant-1", "camera-x", "sid-1", "viewer", epoch(now), exp)
            .await
            .unwrap();
        mgr.observe("tenant-2", "camera-x", "sid-2", "viewer", epoch(now), exp)
            .await
            .unwrap();

        let closed = mgr
            .close_for_stream("tenant-1", "camera-x", EndReason::Deprovisioned)
            .await;
        assert_eq!(closed, 1);

        let other = mgr
            .list(&SessionFilter {
                tenant_id: Some("tenant-2".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(other[0].status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn list_sorts_by_last_seen_descending() {
        let mgr = manager(Duration::from_secs(60));
        let now = Utc::now();
        let exp = epoch(now + ChronoDuration::seconds(600));
        mgr.observe("tenant-a", "camera-a", "sid-old", "viewer", epoch(now), exp)
            .await
            .unwrap();
        sleep(Duration::from_millis(15)).await;
        mgr.observe("tenant-a", "camera-a", "sid-new", "viewer", epoch(now), exp)
            .await
            .unwrap();

        let records = mgr.list(&SessionFilter::default()).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sid, "sid-new");
        assert_eq!(records[1].sid, "sid-old");
    }
}

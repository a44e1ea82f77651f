//! Background health probing.
//!
//! The loop only talks to the `HealthProber` trait; the simulated prober
//! below stands in for a real RTSP probe and can be swapped without touching
//! the loop or the registry contract.

use crate::registry::StreamRegistry;
use crate::state::AppState;
use chrono::Utc;
use common::streams::{ConnectivityState, StreamEntry, StreamHealth, StreamKey, StreamStatus};
use rand::Rng;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

pub trait HealthProber: Send + Sync {
    /// Sample current health for a ready stream.
    fn sample(&self, entry: &StreamEntry) -> StreamHealth;

    /// Health reported for the first probe after provisioning, which always
    /// succeeds and promotes the entry to `ready`.
    fn sample_online(&self, entry: &StreamEntry) -> StreamHealth;
}

/// Synthesizes probe outcomes from a fixed distribution:
/// 78% online, 15% degraded, 7% offline.
pub struct SimulatedProber;

impl SimulatedProber {
    fn online_health(&self) -> StreamHealth {
        let mut rng = rand::thread_rng();
        StreamHealth {
            connectivity: ConnectivityState::Online,
            latency_ms: Some(rng.gen_range(70..=130)),
            packet_loss_pct: Some(rng.gen_range(0.0..=0.3)),
            jitter_ms: Some(rng.gen_range(3..=12)),
            error: None,
            checked_at: Utc::now(),
        }
    }
}

impl HealthProber for SimulatedProber {
    fn sample(&self, _entry: &StreamEntry) -> StreamHealth {
        let mut rng = rand::thread_rng();
        let draw: f64 = rng.gen();
        if draw < 0.78 {
            self.online_health()
        } else if draw < 0.93 {
            StreamHealth {
                connectivity: ConnectivityState::Degraded,
                latency_ms: Some(rng.gen_range(160..=320)),
                packet_loss_pct: Some(rng.gen_range(1.0..=5.0)),
                jitter_ms: Some(rng.gen_range(15..=45)),
                error: None,
                checked_at: Utc::now(),
            }
        } else {
            StreamHealth::offline("stream unreachable", Utc::now())
        }
    }

    fn sample_online(&self, _entry: &StreamEntry) -> StreamHealth {
        self.online_health()
    }
}

/// One probe pass over every registered stream. Each entry is transformed
/// independently; a failure on one entry never interrupts the cycle, and
/// `checked_at` is refreshed for all of them.
pub async fn run_probe_cycle(registry: &StreamRegistry, prober: &dyn HealthProber) {
    for entry in registry.iterate().await {
        let key = StreamKey::new(&entry.tenant_id, &entry.camera_id);
        let updated = registry
            .update_probe(&key, |entry| {
                let now = Utc::now();
                match entry.status {
                    StreamStatus::Stopped => {
                        entry.health = StreamHealth::offline("deprovisioned", now);
                    }
                    StreamStatus::Provisioning => {
                        entry.status = StreamStatus::Ready;
                        entry.health = prober.sample_online(entry);
                        debug!(stream = %key, "stream promoted to ready on first probe");
                    }
                    StreamStatus::Ready => {
                        entry.health = prober.sample(entry);
                    }
                }
                entry.updated_at = now;
            })
            .await;
        if !updated {
            warn!(stream = %key, "stream disappeared during probe cycle");
        }
    }
}

/// Background probe at the configured interval, until aborted on shutdown.
pub async fn run_probe_loop(state: AppState, prober: Arc<dyn HealthProber>) {
    let interval = state.config().probe_interval;
    loop {
        sleep(interval).await;
        run_probe_cycle(state.registry(), prober.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetProducer;
    use common::streams::StreamSource;
    use tempfile::TempDir;

    /// Deterministic prober for loop tests.
    struct FixedProber(ConnectivityState);

    impl HealthProber for FixedProber {
        fn sample(&self, _entry: &StreamEntry) -> StreamHealth {
            match self.0 {
                ConnectivityState::Online => StreamHealth::online(Utc::now()),
                ConnectivityState::Degraded => StreamHealth::degraded("lossy", Utc::now()),
                ConnectivityState::Offline => {
                    StreamHealth::offline("stream unreachable", Utc::now())
                }
            }
        }

        fn sample_online(&self, _entry: &StreamEntry) -> StreamHealth {
            StreamHealth::online(Utc::now())
        }
    }

    async fn seeded_registry() -> (TempDir, StreamRegistry) {
        let dir = TempDir::new().unwrap();
        let producer = AssetProducer::new(dir.path());
        let registry = StreamRegistry::new();
        registry
            .upsert(
                StreamKey::new("tenant-a", "camera-a"),
                "rtsp://demo/a".into(),
                StreamSource::default(),
                &producer,
            )
            .await
            .unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn probe_refreshes_checked_at_for_every_entry() {
        let (_dir, registry) = seeded_registry().await;
        let before = registry
            .get(&StreamKey::new("tenant-a", "camera-a"))
            .await
            .unwrap()
            .health
            .checked_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        run_probe_cycle(&registry, &FixedProber(ConnectivityState::Online)).await;

        let after = registry
            .get(&StreamKey::new("tenant-a", "camera-a"))
            .await
            .unwrap()
            .health
            .checked_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn provisioning_promotes_to_ready_with_online_health() {
        let (_dir, registry) = seeded_registry().await;
        let key = StreamKey::new("tenant-a", "camera-a");
        registry
            .update_probe(&key, |e| e.status = StreamStatus::Provisioning)
            .await;

        // Even a prober that reports offline for steady-state streams
        // synthesizes a successful first probe.
        run_probe_cycle(&registry, &FixedProber(ConnectivityState::Offline)).await;

        let entry = registry.get(&key).await.unwrap();
        assert_eq!(entry.status, StreamStatus::Ready);
        assert_eq!(entry.health.connectivity, ConnectivityState::Online);
    }

    #[tokio::test]
    async fn stopped_streams_keep_offline_health() {
        let (_dir, registry) = seeded_registry().await;
        let key = StreamKey::new("tenant-a", "camera-a");
        registry.mark_stopped(&key).await;

        run_probe_cycle(&registry, &FixedProber(ConnectivityState::Online)).await;

        let entry = registry.get(&key).await.unwrap();
        assert_eq!(entry.status, StreamStatus::Stopped);
        assert_eq!(entry.health.connectivity, ConnectivityState::Offline);
        assert_eq!(entry.health.error.as_deref(), Some("deprovisioned"));
    }

    #[test]
    fn simulated_prober_stays_within_bounds() {
        let prober = SimulatedProber;
        let entry_health = prober.sample_online(&dummy_entry());
        assert_eq!(entry_health.connectivity, ConnectivityState::Online);
        let latency = entry_health.latency_ms.unwrap();
        assert!((70..=130).contains(&latency));
        let loss = entry_health.packet_loss_pct.unwrap();
        assert!((0.0..=0.3).contains(&loss));
        let jitter = entry_health.jitter_ms.unwrap();
        assert!((3..=12).contains(&jitter));

        for _ in 0..200 {
            let health = prober.sample(&dummy_entry());
            match health.connectivity {
                ConnectivityState::Online => {
                    assert!((70..=130).contains(&health.latency_ms.unwrap()));
                }
                ConnectivityState::Degraded => {
                    assert!((160..=320).contains(&health.latency_ms.unwrap()));
                    assert!((1.0..=5.0).contains(&health.packet_loss_pct.unwrap()));
                }
                ConnectivityState::Offline => {
                    assert!(health.latency_ms.is_none());
                    assert_eq!(health.error.as_deref(), Some("stream unreachable"));
                }
            }
        }
    }

    fn dummy_entry() -> StreamEntry {
        StreamEntry {
            tenant_id: "tenant-a".into(),
            camera_id: "camera-a".into(),
            rtsp_url: "rtsp://demo/a".into(),
            source: StreamSource::default(),
            version: 1,
            status: StreamStatus::Ready,
            health: StreamHealth::online(Utc::now()),
            updated_at: Utc::now(),
        }
    }
}

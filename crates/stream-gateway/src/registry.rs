//! Authoritative map of provisioned streams keyed by (tenant, camera).

use crate::assets::AssetProducer;
use anyhow::Result;
use chrono::Utc;
use common::streams::{StreamEntry, StreamHealth, StreamKey, StreamSource, StreamStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

pub struct UpsertOutcome {
    pub entry: StreamEntry,
    pub reprovisioned: bool,
}

/// In-memory stream registry. All read-modify-write cycles run under one
/// lock, so concurrent provisions on the same key serialize and `version`
/// stays monotonic. Entries are never removed; `mark_stopped` retains them
/// so post-deprovision playback gets a distinct answer.
#[derive(Default)]
pub struct StreamRegistry {
    inner: RwLock<HashMap<StreamKey, StreamEntry>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision or reprovision a stream.
    ///
    /// A byte-equal request against a live entry is idempotent: the entry is
    /// returned unchanged with `reprovisioned = false`. Any config change
    /// (including reordering `target_profiles`) bumps `version` by one. A
    /// stopped entry is always reprovisioned, even on identical config, so a
    /// deprovisioned camera can be brought back.
    ///
    /// The asset write happens inside the critical section; the entry only
    /// transitions to `ready` once its manifest and segment exist on disk.
    pub async fn upsert(
        &self,
        key: StreamKey,
        rtsp_url: String,
        source: StreamSource,
        producer: &AssetProducer,
    ) -> Result<UpsertOutcome> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let version = match inner.get(&key) {
            Some(existing) => {
                if existing.status != StreamStatus::Stopped
                    && existing.rtsp_url == rtsp_url
                    && existing.source == source
                {
                    return Ok(UpsertOutcome {
                        entry: existing.clone(),
                        reprovisioned: false,
                    });
                }
                existing.version + 1
            }
            None => 1,
        };

        let entry = StreamEntry {
            tenant_id: key.tenant_id.clone(),
            camera_id: key.camera_id.clone(),
            rtsp_url,
            source,
            version,
            status: StreamStatus::Provisioning,
            health: StreamHealth::degraded("provisioning", now),
            updated_at: now,
        };
        inner.insert(key.clone(), entry);

        producer
            .ensure_placeholder_assets(&key.tenant_id, &key.camera_id)
            .await?;

        let entry = inner
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("stream entry vanished during provision"))?;
        let now = Utc::now();
        entry.status = StreamStatus::Ready;
        entry.health = StreamHealth::online(now);
        entry.updated_at = now;

        info!(stream = %key, version, "stream provisioned");
        Ok(UpsertOutcome {
            entry: entry.clone(),
            reprovisioned: true,
        })
    }

    /// Mark a stream stopped. Returns whether an entry existed.
    pub async fn mark_stopped(&self, key: &StreamKey) -> bool {
        let mut inner = self.inner.write().await;
        match inner.get_mut(key) {
            Some(entry) => {
                let now = Utc::now();
                entry.status = StreamStatus::Stopped;
                entry.health = StreamHealth::offline("deprovisioned", now);
                entry.updated_at = now;
                info!(stream = %key, "stream deprovisioned");
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, key: &StreamKey) -> Option<StreamEntry> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn iterate(&self) -> Vec<StreamEntry> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Apply a probe mutation to one entry under the write lock. Returns
    /// false when the entry does not exist; entries are never deleted, so
    /// callers treat that as unexpected.
    pub async fn update_probe<F>(&self, key: &StreamKey, mutate: F) -> bool
    where
        F: FnOnce(&mut StreamEntry),
    {
        let mut inner = self.inner.write().await;
        match inner.get_mut(key) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }
}

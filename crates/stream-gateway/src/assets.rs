//! Placeholder HLS asset production and retry-wrapped reads.
//!
//! The producer writes a synthetic single-segment playlist per stream. It is
//! the only component that knows the bytes are fake: the reader, the rewrite
//! and the HTTP surface operate on the same contract a real packager would
//! satisfy.

use crate::metrics::PLAYBACK_READ_RETRIES_TOTAL;
use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::debug;

/// Literal marker embedded in every placeholder segment.
pub const SEGMENT_MARKER: &[u8] = b"NEARHOME_STREAM_SEGMENT";

pub const MANIFEST_FILE: &str = "index.m3u8";
pub const SEGMENT_FILE: &str = "segment0.ts";

/// Single-segment playlist referencing `segment0.ts` relatively. The served
/// copy is rewritten to an absolute tokenized URL.
pub const PLACEHOLDER_MANIFEST: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:5\n\
#EXT-X-MEDIA-SEQUENCE:0\n\
#EXTINF:5.0,\n\
segment0.ts\n";

// Base64url alphabet plus the '.' separator stay literal; everything else in
// a token would be percent-encoded.
const TOKEN_QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Manifest,
    Segment,
}

impl AssetKind {
    pub fn file_name(self) -> &'static str {
        match self {
            AssetKind::Manifest => MANIFEST_FILE,
            AssetKind::Segment => SEGMENT_FILE,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            AssetKind::Manifest => "application/vnd.apple.mpegurl",
            AssetKind::Segment => "video/MP2T",
        }
    }

    /// Metric label value.
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Manifest => "manifest",
            AssetKind::Segment => "segment",
        }
    }
}

pub fn stream_dir(root: &Path, tenant_id: &str, camera_id: &str) -> PathBuf {
    root.join(tenant_id).join(camera_id)
}

/// Writes the placeholder manifest and segment for a stream.
pub struct AssetProducer {
    root: PathBuf,
}

impl AssetProducer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the stream directory (recursively, idempotently) and write both
    /// placeholder assets. Existing files are overwritten; each file is
    /// replaced via write-then-rename so a concurrent reader observes either
    /// the previous or the next version, never a torn file.
    pub async fn ensure_placeholder_assets(&self, tenant_id: &str, camera_id: &str) -> Result<()> {
        let dir = stream_dir(&self.root, tenant_id, camera_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create stream dir {}", dir.display()))?;

        write_atomic(&dir.join(SEGMENT_FILE), SEGMENT_MARKER).await?;
        write_atomic(&dir.join(MANIFEST_FILE), PLACEHOLDER_MANIFEST.as_bytes()).await?;
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move {} into place", tmp.display()))?;
    Ok(())
}

/// Exponential backoff bounds for transient asset reads.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): min(base * 2^(attempt-1), max).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// A manifest swap can make the file briefly absent between unlink and
// rename; those reads are retried, everything else propagates.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy
    )
}

/// Reads stream assets with bounded retry on transient misses.
pub struct AssetReader {
    root: PathBuf,
    policy: RetryPolicy,
}

impl AssetReader {
    pub fn new(root: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub async fn read(
        &self,
        tenant_id: &str,
        camera_id: &str,
        kind: AssetKind,
    ) -> io::Result<Vec<u8>> {
        let path = stream_dir(&self.root, tenant_id, camera_id).join(kind.file_name());
        let mut attempt = 0u32;
        loop {
            match fs::read(&path).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if attempt < self.policy.max_retries && is_transient(&err) => {
                    attempt += 1;
                    PLAYBACK_READ_RETRIES_TOTAL
                        .with_label_values(&[tenant_id, camera_id, kind.as_str()])
                        .inc();
                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        path = %path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient asset read failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Rewrite the relative segment reference into an absolute playback URL that
/// carries the token. A literal substitution, not a manifest parse; the
/// placeholder contains exactly one segment reference.
pub fn rewrite_manifest(manifest: &str, tenant_id: &str, camera_id: &str, token: &str) -> String {
    let encoded = utf8_percent_encode(token, TOKEN_QUERY_SET).to_string();
    let url = format!("/playback/{tenant_id}/{camera_id}/{SEGMENT_FILE}?token={encoded}");
    manifest.replace(SEGMENT_FILE, &url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries: retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(10));
        assert_eq!(p.delay_for(2), Duration::from_millis(20));
        assert_eq!(p.delay_for(3), Duration::from_millis(40));
        assert_eq!(p.delay_for(4), Duration::from_millis(40));
        assert_eq!(p.delay_for(40), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn producer_writes_marker_and_manifest() {
        let dir = TempDir::new().unwrap();
        let producer = AssetProducer::new(dir.path());
        producer
            .ensure_placeholder_assets("tenant-a", "camera-a")
            .await
            .unwrap();

        let segment = fs::read(dir.path().join("tenant-a/camera-a/segment0.ts"))
            .await
            .unwrap();
        assert_eq!(segment, SEGMENT_MARKER);

        let manifest = fs::read_to_string(dir.path().join("tenant-a/camera-a/index.m3u8"))
            .await
            .unwrap();
        assert!(manifest.starts_with("#EXTM3U"));
        assert!(manifest.contains("#EXT-X-TARGETDURATION:5"));
        assert!(manifest.contains("segment0.ts"));

        // Re-running overwrites without error.
        producer
            .ensure_placeholder_assets("tenant-a", "camera-a")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reader_returns_bytes_without_retry_when_present() {
        let dir = TempDir::new().unwrap();
        let producer = AssetProducer::new(dir.path());
        producer
            .ensure_placeholder_assets("tenant-b", "camera-b")
            .await
            .unwrap();

        let reader = AssetReader::new(dir.path(), policy(3));
        let bytes = reader
            .read("tenant-b", "camera-b", AssetKind::Segment)
            .await
            .unwrap();
        assert_eq!(bytes, SEGMENT_MARKER);
    }

    #[tokio::test]
    async fn reader_retries_transient_miss_and_counts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let reader = AssetReader::new(&root, policy(4));

        let before = PLAYBACK_READ_RETRIES_TOTAL
            .with_label_values(&["tenant-retry", "camera-retry", "manifest"])
            .get();

        // The manifest appears a couple of backoff steps after the first read.
        let producer_root = root.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            AssetProducer::new(producer_root)
                .ensure_placeholder_assets("tenant-retry", "camera-retry")
                .await
                .unwrap();
        });

        let bytes = reader
            .read("tenant-retry", "camera-retry", AssetKind::Manifest)
            .await
            .unwrap();
        writer.await.unwrap();
        assert!(bytes.starts_with(b"#EXTM3U"));

        let after = PLAYBACK_READ_RETRIES_TOTAL
            .with_label_values(&["tenant-retry", "camera-retry", "manifest"])
            .get();
        assert!(after > before, "expected at least one counted retry");
    }

    #[tokio::test]
    async fn reader_exhausts_retries_on_permanent_miss() {
        let dir = TempDir::new().unwrap();
        let reader = AssetReader::new(dir.path(), policy(2));
        let err = reader
            .read("tenant-none", "camera-none", AssetKind::Segment)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn rewrite_substitutes_segment_reference() {
        let token = "eyJhbGciOi.sig_part-x";
        let rewritten = rewrite_manifest(PLACEHOLDER_MANIFEST, "tenant-a", "camera-a", token);
        assert!(rewritten.contains(
            "/playback/tenant-a/camera-a/segment0.ts?token=eyJhbGciOi.sig_part-x"
        ));
        assert!(!rewritten.contains("\nsegment0.ts\n"));
    }

    #[test]
    fn rewrite_percent_encodes_non_token_characters() {
        let rewritten = rewrite_manifest(PLACEHOLDER_MANIFEST, "t", "c", "a+b c");
        assert!(rewritten.contains("token=a%2Bb%20c"));
    }
}

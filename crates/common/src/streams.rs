use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Identity of one provisioned stream. Entries sharing a `camera_id` across
/// distinct tenants are fully independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub tenant_id: String,
    pub camera_id: String,
}

impl StreamKey {
    pub fn new(tenant_id: impl Into<String>, camera_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            camera_id: camera_id.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.camera_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Auto,
    Tcp,
    Udp,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Auto => "auto",
            TransportMode::Tcp => "tcp",
            TransportMode::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TransportMode::Auto),
            "tcp" => Ok(TransportMode::Tcp),
            "udp" => Ok(TransportMode::Udp),
            _ => Err(format!("unknown transport '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodecHint {
    H264,
    H265,
    Mpeg4,
    Unknown,
}

impl CodecHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecHint::H264 => "h264",
            CodecHint::H265 => "h265",
            CodecHint::Mpeg4 => "mpeg4",
            CodecHint::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CodecHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" => Ok(CodecHint::H264),
            "h265" | "hevc" => Ok(CodecHint::H265),
            "mpeg4" => Ok(CodecHint::Mpeg4),
            "unknown" => Ok(CodecHint::Unknown),
            _ => Err(format!("unknown codec hint '{s}'")),
        }
    }
}

/// Source configuration for a stream. Equality is deep and ordered:
/// reordering `target_profiles` counts as a configuration change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamSource {
    pub transport: TransportMode,
    pub codec_hint: CodecHint,
    pub target_profiles: Vec<String>,
}

impl Default for StreamSource {
    fn default() -> Self {
        Self {
            transport: TransportMode::Auto,
            codec_hint: CodecHint::Unknown,
            target_profiles: vec!["main".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Provisioning,
    Ready,
    Stopped,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Provisioning => "provisioning",
            StreamStatus::Ready => "ready",
            StreamStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Degraded,
    Offline,
}

impl ConnectivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Degraded => "degraded",
            ConnectivityState::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest probe observation for a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamHealth {
    pub connectivity: ConnectivityState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl StreamHealth {
    pub fn online(checked_at: DateTime<Utc>) -> Self {
        Self {
            connectivity: ConnectivityState::Online,
            latency_ms: None,
            packet_loss_pct: None,
            jitter_ms: None,
            error: None,
            checked_at,
        }
    }

    pub fn degraded(error: impl Into<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            connectivity: ConnectivityState::Degraded,
            latency_ms: None,
            packet_loss_pct: None,
            jitter_ms: None,
            error: Some(error.into()),
            checked_at,
        }
    }

    pub fn offline(error: impl Into<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            connectivity: ConnectivityState::Offline,
            latency_ms: None,
            packet_loss_pct: None,
            jitter_ms: None,
            error: Some(error.into()),
            checked_at,
        }
    }
}

/// One provisioned playback source. Entries are never deleted; deprovisioned
/// streams are retained in `stopped` so later playback attempts can be
/// answered with a distinct error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    pub tenant_id: String,
    pub camera_id: String,
    pub rtsp_url: String,
    pub source: StreamSource,
    pub version: u64,
    pub status: StreamStatus,
    pub health: StreamHealth,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_parses_case_insensitively() {
        assert_eq!("TCP".parse::<TransportMode>().unwrap(), TransportMode::Tcp);
        assert_eq!("auto".parse::<TransportMode>().unwrap(), TransportMode::Auto);
        assert!("quic".parse::<TransportMode>().is_err());
    }

    #[test]
    fn codec_hint_accepts_hevc_alias() {
        assert_eq!("hevc".parse::<CodecHint>().unwrap(), CodecHint::H265);
        assert!("av1".parse::<CodecHint>().is_err());
    }

    #[test]
    fn source_equality_is_order_sensitive() {
        let a = StreamSource {
            transport: TransportMode::Tcp,
            codec_hint: CodecHint::H264,
            target_profiles: vec!["main".into(), "sub".into()],
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.target_profiles.reverse();
        assert_ne!(a, b);
    }

    #[test]
    fn entry_serializes_camel_case() {
        let entry = StreamEntry {
            tenant_id: "tenant-a".into(),
            camera_id: "camera-a".into(),
            rtsp_url: "rtsp://demo/camera-a".into(),
            source: StreamSource::default(),
            version: 1,
            status: StreamStatus::Ready,
            health: StreamHealth::online(Utc::now()),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["tenantId"], "tenant-a");
        assert_eq!(value["rtspUrl"], "rtsp://demo/camera-a");
        assert_eq!(value["status"], "ready");
        assert_eq!(value["health"]["connectivity"], "online");
        assert_eq!(value["source"]["targetProfiles"][0], "main");
    }
}

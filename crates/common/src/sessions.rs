use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Issued,
    Active,
    Ended,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Issued => "issued",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Expired => "expired",
        }
    }

    /// `ended` and `expired` are terminal: a session that reached either can
    /// never serve playback again, even on a token that is still valid.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Expired)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "issued" => Ok(SessionStatus::Issued),
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            "expired" => Ok(SessionStatus::Expired),
            _ => Err(format!("unknown session status '{s}'")),
        }
    }
}

/// Why a session left the non-terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    TokenExpired,
    IdleTimeout,
    Deprovisioned,
    Ended,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::TokenExpired => "token_expired",
            EndReason::IdleTimeout => "idle_timeout",
            EndReason::Deprovisioned => "deprovisioned",
            EndReason::Ended => "ended",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playback session, identified by `(tenant_id, camera_id, sid)` where
/// the `sid` originates from the playback token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub tenant_id: String,
    pub camera_id: String,
    pub sid: String,
    pub sub: String,
    pub status: SessionStatus,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

/// AND-combined listing filter.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub tenant_id: Option<String>,
    pub camera_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub sid: Option<String>,
}

impl SessionFilter {
    pub fn matches(&self, record: &SessionRecord) -> bool {
        if let Some(tenant_id) = &self.tenant_id {
            if record.tenant_id != *tenant_id {
                return false;
            }
        }
        if let Some(camera_id) = &self.camera_id {
            if record.camera_id != *camera_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(sid) = &self.sid {
            if record.sid != *sid {
                return false;
            }
        }
        true
    }
}

/// Counts reported by one sweep pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepOutcome {
    pub expired: u64,
    pub ended: u64,
}

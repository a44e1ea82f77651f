//! Playback token signing and verification.
//!
//! Tokens are `base64url(payload) "." base64url(signature)` where the
//! signature is HMAC-SHA256 over the *encoded* payload text, so neither side
//! needs canonical JSON. The secret is a symmetric key shared with the
//! control plane, which issues the tokens.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Schema-exact token payload. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlaybackClaims {
    pub sub: String,
    pub tid: String,
    pub cid: String,
    pub sid: String,
    pub exp: u64,
    pub iat: u64,
    pub v: u8,
}

impl PlaybackClaims {
    fn is_well_formed(&self) -> bool {
        !self.sub.is_empty()
            && !self.tid.is_empty()
            && !self.cid.is_empty()
            && !self.sid.is_empty()
            && self.exp > 0
            && self.iat > 0
            && self.v == 1
    }
}

/// Verification failures, in check order. The first failing check wins.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("playback token is missing")]
    Missing,
    #[error("playback token is malformed")]
    Format,
    #[error("playback token signature mismatch")]
    Signature,
    #[error("playback token payload is invalid")]
    Payload,
    #[error("playback token is expired")]
    Expired,
}

/// Sign claims into the wire token format. This is the control-plane side of
/// the shared-secret contract; the gateway only uses it in tests.
pub fn sign(claims: &PlaybackClaims, secret: &str) -> Result<String> {
    let json = serde_json::to_vec(claims).context("failed to serialize claims")?;
    let payload = URL_SAFE_NO_PAD.encode(json);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .context("failed to initialize hmac")?;
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{payload}.{signature}"))
}

/// Stateless verifier for playback tokens.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a token against `now` in epoch seconds.
    ///
    /// Checks run in a fixed order: presence, format, signature, payload
    /// schema, expiry. The signature is checked before the payload decodes,
    /// and the comparison does not leak equality through timing; signatures
    /// of the wrong length fail the same way as wrong bytes.
    pub fn verify(&self, token: Option<&str>, now_epoch: u64) -> Result<PlaybackClaims, TokenError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(TokenError::Missing),
        };

        if token.matches('.').count() != 1 {
            return Err(TokenError::Format);
        }
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Format)?;
        if payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(TokenError::Format);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Signature)?;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| TokenError::Signature)?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Signature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Payload)?;
        let claims: PlaybackClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Payload)?;
        if !claims.is_well_formed() {
            return Err(TokenError::Payload);
        }

        if claims.exp <= now_epoch {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

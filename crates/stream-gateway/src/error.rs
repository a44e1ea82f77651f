use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::tokens::TokenError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One field-level validation failure, reported in the `details` array of a
/// `VALIDATION_ERROR` response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Typed API errors. Handlers return these as values; the single
/// `IntoResponse` impl renders the wire envelope at the edge.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("playback token is missing")]
    TokenMissing,
    #[error("playback token is malformed")]
    TokenFormatInvalid,
    #[error("playback token signature mismatch")]
    TokenSignatureInvalid,
    #[error("playback token payload is invalid")]
    TokenPayloadInvalid,
    #[error("playback token is expired")]
    TokenExpired,
    #[error("token scope does not match the requested stream")]
    TokenScopeMismatch,
    #[error("playback session is closed")]
    SessionClosed,
    #[error("stream is not provisioned")]
    StreamNotFound,
    #[error("stream is still provisioning")]
    StreamNotReady,
    #[error("stream has been deprovisioned")]
    StreamStopped,
    #[error("manifest unavailable")]
    ManifestNotFound,
    #[error("segment unavailable")]
    SegmentNotFound,
    #[error("Route not found")]
    RouteNotFound,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::TokenMissing => "PLAYBACK_TOKEN_MISSING",
            ApiError::TokenFormatInvalid => "PLAYBACK_TOKEN_FORMAT_INVALID",
            ApiError::TokenSignatureInvalid => "PLAYBACK_TOKEN_SIGNATURE_INVALID",
            ApiError::TokenPayloadInvalid => "PLAYBACK_TOKEN_PAYLOAD_INVALID",
            ApiError::TokenExpired => "PLAYBACK_TOKEN_EXPIRED",
            ApiError::TokenScopeMismatch => "PLAYBACK_TOKEN_SCOPE_MISMATCH",
            ApiError::SessionClosed => "PLAYBACK_SESSION_CLOSED",
            ApiError::StreamNotFound => "PLAYBACK_STREAM_NOT_FOUND",
            ApiError::StreamNotReady => "PLAYBACK_STREAM_NOT_READY",
            ApiError::StreamStopped => "PLAYBACK_STREAM_STOPPED",
            ApiError::ManifestNotFound => "PLAYBACK_MANIFEST_NOT_FOUND",
            ApiError::SegmentNotFound => "PLAYBACK_SEGMENT_NOT_FOUND",
            ApiError::RouteNotFound => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::TokenMissing
            | ApiError::TokenFormatInvalid
            | ApiError::TokenSignatureInvalid
            | ApiError::TokenPayloadInvalid
            | ApiError::TokenExpired
            | ApiError::SessionClosed => StatusCode::UNAUTHORIZED,
            ApiError::TokenScopeMismatch => StatusCode::FORBIDDEN,
            ApiError::StreamNotFound
            | ApiError::ManifestNotFound
            | ApiError::SegmentNotFound
            | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::StreamNotReady => StatusCode::CONFLICT,
            ApiError::StreamStopped => StatusCode::GONE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Validation(details) => json!({
                "code": self.code(),
                "message": self.to_string(),
                "details": details,
            }),
            _ => json!({
                "code": self.code(),
                "message": self.to_string(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Missing => ApiError::TokenMissing,
            TokenError::Format => ApiError::TokenFormatInvalid,
            TokenError::Signature => ApiError::TokenSignatureInvalid,
            TokenError::Payload => ApiError::TokenPayloadInvalid,
            TokenError::Expired => ApiError::TokenExpired,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

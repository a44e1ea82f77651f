use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{info, warn};

use super::dto::{DeprovisionRequest, ProvisionRequest, SessionsQuery, TokenQuery};
use crate::assets::{is_transient, rewrite_manifest, AssetKind};
use crate::error::{ApiError, FieldError};
use crate::metrics::{PLAYBACK_ERRORS_TOTAL, PLAYBACK_REQUESTS_TOTAL};
use crate::state::AppState;
use common::sessions::{EndReason, SessionFilter, SessionStatus};
use common::streams::{CodecHint, StreamKey, StreamSource, StreamStatus, TransportMode};
use common::validation;

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "streams": state.registry().len().await,
        "sessions": state.sessions().len().await,
        "storageDir": state.config().storage_dir.display().to_string(),
    }))
}

pub async fn stream_health(
    State(state): State<AppState>,
    Path((tenant_id, camera_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state
        .registry()
        .get(&StreamKey::new(&tenant_id, &camera_id))
        .await
    {
        Some(entry) => (StatusCode::OK, Json(json!({ "ok": true, "data": entry }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "reason": "not_provisioned" })),
        ),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = crate::metrics::render(state.registry(), state.sessions()).await;
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn provision(
    State(state): State<AppState>,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(body_rejection)?;

    let mut details = Vec::new();
    if let Err(err) = validation::validate_id(&req.tenant_id, "tenantId") {
        details.push(FieldError::new("tenantId", err.to_string()));
    }
    if let Err(err) = validation::validate_id(&req.camera_id, "cameraId") {
        details.push(FieldError::new("cameraId", err.to_string()));
    }
    if let Err(err) = validation::validate_rtsp_url(&req.rtsp_url, "rtspUrl") {
        details.push(FieldError::new("rtspUrl", err.to_string()));
    }
    let transport = parse_or_default(
        req.transport.as_deref(),
        TransportMode::Auto,
        "transport",
        &mut details,
    );
    let codec_hint = parse_or_default(
        req.codec_hint.as_deref(),
        CodecHint::Unknown,
        "codecHint",
        &mut details,
    );
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }

    let source = StreamSource {
        transport,
        codec_hint,
        target_profiles: req
            .target_profiles
            .unwrap_or_else(|| vec!["main".to_string()]),
    };
    let key = StreamKey::new(&req.tenant_id, &req.camera_id);
    let outcome = state
        .registry()
        .upsert(key, req.rtsp_url, source, state.producer())
        .await?;

    let playback_path = format!(
        "/playback/{}/{}/index.m3u8",
        outcome.entry.tenant_id, outcome.entry.camera_id
    );
    let mut data =
        serde_json::to_value(&outcome.entry).map_err(|err| ApiError::Internal(err.to_string()))?;
    data["playbackPath"] = json!(playback_path);
    data["reprovisioned"] = json!(outcome.reprovisioned);
    Ok(Json(json!({ "data": data })))
}

pub async fn deprovision(
    State(state): State<AppState>,
    payload: Result<Json<DeprovisionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(body_rejection)?;

    let key = StreamKey::new(&req.tenant_id, &req.camera_id);
    let removed = state.registry().mark_stopped(&key).await;
    if removed {
        let closed = state
            .sessions()
            .close_for_stream(&req.tenant_id, &req.camera_id, EndReason::Deprovisioned)
            .await;
        info!(stream = %key, closed_sessions = closed, "deprovisioned");
    }
    Ok(Json(json!({ "data": { "removed": removed } })))
}

pub async fn playback_manifest(
    State(state): State<AppState>,
    Path((tenant_id, camera_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Response {
    serve_playback(state, tenant_id, camera_id, AssetKind::Manifest, query.token).await
}

pub async fn playback_segment(
    State(state): State<AppState>,
    Path((tenant_id, camera_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Response {
    serve_playback(state, tenant_id, camera_id, AssetKind::Segment, query.token).await
}

// Outcome metrics are recorded here, on both paths, no matter where the
// handler bailed out.
async fn serve_playback(
    state: AppState,
    tenant_id: String,
    camera_id: String,
    kind: AssetKind,
    token: Option<String>,
) -> Response {
    let result = handle_playback(&state, &tenant_id, &camera_id, kind, token.as_deref()).await;

    let result_label = if result.is_ok() { "ok" } else { "error" };
    PLAYBACK_REQUESTS_TOTAL
        .with_label_values(&[&tenant_id, &camera_id, kind.as_str(), result_label])
        .inc();

    match result {
        Ok(response) => response,
        Err(err) => {
            PLAYBACK_ERRORS_TOTAL
                .with_label_values(&[&tenant_id, &camera_id, kind.as_str(), err.code()])
                .inc();
            warn!(
                tenant_id = %tenant_id,
                camera_id = %camera_id,
                asset = kind.as_str(),
                code = err.code(),
                "playback refused"
            );
            err.into_response()
        }
    }
}

// Check order is part of the contract: token, scope, stream, session, read.
async fn handle_playback(
    state: &AppState,
    tenant_id: &str,
    camera_id: &str,
    kind: AssetKind,
    token: Option<&str>,
) -> Result<Response, ApiError> {
    let now_epoch = Utc::now().timestamp().max(0) as u64;
    let claims = state.verifier().verify(token, now_epoch)?;

    if claims.tid != tenant_id || claims.cid != camera_id {
        return Err(ApiError::TokenScopeMismatch);
    }

    let key = StreamKey::new(tenant_id, camera_id);
    let entry = state
        .registry()
        .get(&key)
        .await
        .ok_or(ApiError::StreamNotFound)?;
    match entry.status {
        StreamStatus::Provisioning => return Err(ApiError::StreamNotReady),
        StreamStatus::Stopped => return Err(ApiError::StreamStopped),
        StreamStatus::Ready => {}
    }

    state
        .sessions()
        .observe(
            tenant_id,
            camera_id,
            &claims.sid,
            &claims.sub,
            claims.iat,
            claims.exp,
        )
        .await
        .map_err(|_| ApiError::SessionClosed)?;

    let bytes = state
        .reader()
        .read(tenant_id, camera_id, kind)
        .await
        .map_err(|err| {
            if is_transient(&err) {
                match kind {
                    AssetKind::Manifest => ApiError::ManifestNotFound,
                    AssetKind::Segment => ApiError::SegmentNotFound,
                }
            } else {
                ApiError::Internal(err.to_string())
            }
        })?;

    let body = match kind {
        AssetKind::Manifest => {
            let manifest = String::from_utf8_lossy(&bytes);
            rewrite_manifest(&manifest, tenant_id, camera_id, token.unwrap_or_default())
                .into_bytes()
        }
        AssetKind::Segment => bytes,
    };

    Ok(([(header::CONTENT_TYPE, kind.content_type())], body).into_response())
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(SessionStatus::from_str(raw).map_err(|message| {
            ApiError::Validation(vec![FieldError::new("status", message)])
        })?),
    };
    let filter = SessionFilter {
        tenant_id: query.tenant_id.filter(|s| !s.is_empty()),
        camera_id: query.camera_id.filter(|s| !s.is_empty()),
        status,
        sid: query.sid.filter(|s| !s.is_empty()),
    };

    let sessions = state.sessions().list(&filter).await;
    Ok(Json(json!({ "data": sessions, "total": sessions.len() })))
}

pub async fn sweep_sessions(State(state): State<AppState>) -> Json<Value> {
    let outcome = state.sessions().sweep().await;
    Json(json!({ "data": { "expired": outcome.expired, "ended": outcome.ended } }))
}

pub async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

fn body_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(vec![FieldError::new("body", rejection.body_text())])
}

fn parse_or_default<T>(
    raw: Option<&str>,
    default: T,
    field: &str,
    details: &mut Vec<FieldError>,
) -> T
where
    T: FromStr<Err = String>,
{
    match raw {
        None => default,
        Some(s) => match s.parse::<T>() {
            Ok(value) => value,
            Err(message) => {
                details.push(FieldError::new(field, message));
                default
            }
        },
    }
}

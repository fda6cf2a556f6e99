//! Thin HTTP shim over the orchestrator, status read and scheduler tick.
//! All digest logic lives below; handlers only translate JSON ⇄ core
//! types and errors ⇄ status codes (validation → 400, conflict → 409,
//! storage → 500).

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::refresh::{RefreshError, RefreshOrchestrator, RefreshRequest, RefreshSummary};
use crate::schedule::{self, TickError, TickOutcome};
use crate::status::{digest_status, DigestStatus, StatusError};
use crate::store::{DigestStore, ScheduleConfig, SettingsStore, SignalStore};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub digests: Arc<dyn DigestStore>,
    pub signals: Arc<dyn SignalStore>,
    pub settings: Arc<dyn SettingsStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/digest/refresh", post(refresh))
        .route("/digest/status", get(status))
        .route("/schedule/tick", post(tick))
        .route("/schedule/config", get(get_schedule).post(set_schedule))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn error_body(code: StatusCode, message: String) -> ApiError {
    (code, Json(json!({ "error": message })))
}

async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshSummary>, ApiError> {
    // Spawned so an abandoned client connection does not cancel a
    // half-done cycle; the snapshot write stays the single commit point.
    let orchestrator = state.orchestrator.clone();
    let result = tokio::spawn(async move { orchestrator.refresh(&req).await })
        .await
        .map_err(|e| {
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("refresh task panicked: {e}"),
            )
        })?;

    match result {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            let code = if e.is_validation() {
                StatusCode::BAD_REQUEST
            } else if e.is_conflict() {
                StatusCode::CONFLICT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err(error_body(code, e.to_string()))
        }
    }
}

#[derive(serde::Deserialize)]
struct StatusQuery {
    date_key: String,
    #[serde(default = "default_timezone")]
    timezone: String,
    window_days: u32,
}

fn default_timezone() -> String {
    "UTC".into()
}

async fn status(
    State(state): State<AppState>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<DigestStatus>, ApiError> {
    let found = digest_status(
        &state.digests,
        &state.signals,
        &q.date_key,
        &q.timezone,
        q.window_days,
    )
    .await
    .map_err(|e| match e {
        StatusError::Validation(v) => error_body(StatusCode::BAD_REQUEST, v.to_string()),
        StatusError::Storage(s) => error_body(StatusCode::INTERNAL_SERVER_ERROR, s.to_string()),
    })?;

    found.map(Json).ok_or_else(|| {
        error_body(
            StatusCode::NOT_FOUND,
            format!("no digest snapshot for ({}, {}d)", q.date_key, q.window_days),
        )
    })
}

async fn tick(State(state): State<AppState>) -> Result<Json<TickOutcome>, ApiError> {
    schedule::run_tick(&state.orchestrator, &state.settings, chrono::Utc::now())
        .await
        .map(Json)
        .map_err(|e| {
            let code = match &e {
                TickError::InvalidTimezone(_) | TickError::InvalidLocalTime(_) => {
                    StatusCode::BAD_REQUEST
                }
                TickError::Refresh(RefreshError::AlreadyExists { .. }) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_body(code, e.to_string())
        })
}

async fn get_schedule(State(state): State<AppState>) -> Result<Json<ScheduleConfig>, ApiError> {
    state
        .settings
        .schedule_config()
        .await
        .map(Json)
        .map_err(|e| error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn set_schedule(
    State(state): State<AppState>,
    Json(cfg): Json<ScheduleConfig>,
) -> Result<Json<ScheduleConfig>, ApiError> {
    state
        .settings
        .update_schedule_config(&cfg)
        .await
        .map_err(|e| error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(cfg))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{SchedulerLoop, TickReport};
use crate::error::EngineError;
use crate::latency::LatencySummary;
use crate::middleware::request_logging;
use crate::models::{
    ArbitrageSignal, DecisionEvent, LatencyMetric, PriceSnapshot, ShadowExecutionMetrics,
    SignalDetectionEvent, SystemStatus,
};
use crate::notifications::Warning;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SchedulerLoop>,
}

/// Create the API router
pub fn create_router(scheduler: Arc<SchedulerLoop>) -> Router {
    let state = AppState { scheduler };

    Router::new()
        .route("/health", get(health_check))
        // Commands
        .route("/api/agent/start", post(start_agent))
        .route("/api/agent/stop", post(stop_agent))
        .route("/api/agent/live-source", post(set_live_source))
        .route("/api/agent/tick", post(run_tick))
        .route("/api/snapshots", get(get_snapshots).post(record_snapshot))
        // Queries
        .route("/api/status", get(get_status))
        .route("/api/decisions", get(get_decisions))
        .route("/api/latency", get(get_latency))
        .route("/api/signals", get(get_signals))
        .route("/api/optimizer/dataset", get(get_optimizer_dataset))
        .route("/api/shadow/metrics", get(get_shadow_metrics))
        // Pair ids contain '/', so capture the rest of the path
        .route("/api/analysis/*pair_id", get(get_analysis))
        .route(
            "/api/notifications",
            get(get_notifications).delete(clear_notifications),
        )
        .route("/api/notifications/:id", delete(remove_notification))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn start_agent(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    let changed = state.scheduler.start()?;
    Ok(Json(CommandResponse {
        changed,
        status: state.scheduler.status(),
    }))
}

async fn stop_agent(State(state): State<AppState>) -> Json<CommandResponse> {
    let changed = state.scheduler.stop();
    Json(CommandResponse {
        changed,
        status: state.scheduler.status(),
    })
}

async fn set_live_source(
    State(state): State<AppState>,
    Json(body): Json<LiveSourceRequest>,
) -> Json<SystemStatus> {
    state.scheduler.agent().set_live_source(body.enabled);
    Json(state.scheduler.status())
}

/// Run one tick now, outside the timer
async fn run_tick(State(state): State<AppState>) -> Result<Json<TickReport>, ApiError> {
    let report = state.scheduler.agent().run_tick().await?;
    Ok(Json(report))
}

async fn record_snapshot(
    State(state): State<AppState>,
    Json(snapshot): Json<PriceSnapshot>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.agent().record_snapshot(snapshot).await?;
    Ok(StatusCode::CREATED)
}

async fn get_snapshots(State(state): State<AppState>) -> Json<Vec<PriceSnapshot>> {
    Json(state.scheduler.agent().snapshots())
}

async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(state.scheduler.status())
}

/// Decision history, oldest first. `limit` keeps the newest N.
async fn get_decisions(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<DecisionEvent>> {
    let mut decisions = state.scheduler.agent().decision_history();
    if let Some(limit) = params.limit {
        let skip = decisions.len().saturating_sub(limit);
        decisions = decisions.split_off(skip);
    }
    Json(decisions)
}

async fn get_latency(State(state): State<AppState>) -> Json<LatencyResponse> {
    let agent = state.scheduler.agent();
    Json(LatencyResponse {
        summary: agent.latency_summary(),
        metrics: agent.latency_metrics(),
    })
}

async fn get_signals(State(state): State<AppState>) -> Json<Vec<SignalDetectionEvent>> {
    Json(state.scheduler.agent().signal_detection_events())
}

async fn get_optimizer_dataset(State(state): State<AppState>) -> Json<Vec<SignalDetectionEvent>> {
    Json(state.scheduler.agent().safe_optimizer_dataset())
}

async fn get_shadow_metrics(State(state): State<AppState>) -> Json<ShadowExecutionMetrics> {
    Json(state.scheduler.agent().shadow_metrics())
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(pair_id): Path<String>,
) -> Result<Json<ArbitrageSignal>, ApiError> {
    let pair_id = pair_id.trim_start_matches('/');
    let agent = state.scheduler.agent();
    if agent.pairs().get_pair_config(pair_id).is_none() {
        return Err(ApiError::NotFound(format!("Pair {} not found", pair_id)));
    }
    Ok(Json(agent.run_arbitrage_analysis(pair_id)?))
}

async fn get_notifications(State(state): State<AppState>) -> Json<Vec<Warning>> {
    Json(state.scheduler.agent().notifications().warnings())
}

async fn clear_notifications(State(state): State<AppState>) -> StatusCode {
    state.scheduler.agent().notifications().clear_all();
    StatusCode::NO_CONTENT
}

async fn remove_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.scheduler.agent().notifications().remove_warning(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Warning {} not found", id)))
    }
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct LiveSourceRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct CommandResponse {
    /// False when the scheduler was already in the requested state
    changed: bool,
    status: SystemStatus,
}

#[derive(Serialize)]
struct LatencyResponse {
    summary: LatencySummary,
    metrics: Vec<LatencyMetric>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            e @ EngineError::SourceUnavailable { .. } => ApiError::Unavailable(e.to_string()),
            e @ (EngineError::PersistenceFailure(_) | EngineError::Config(_)) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::invalid("zero price"), StatusCode::BAD_REQUEST),
            (
                EngineError::source_unavailable("kong", "A/B", "timeout"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                EngineError::PersistenceFailure("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}

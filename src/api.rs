//! Status API: health and lane/scheduler status over HTTP.

use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::worker::{LaneStatus, WorkerDispatcher};

/// Application state shared across handlers.
#[derive(Clone, Default)]
pub struct ApiState {
    /// Absent when the worker component is disabled.
    pub dispatcher: Option<Arc<WorkerDispatcher>>,
    /// Absent when the scheduler component is disabled.
    pub scheduler: Option<Arc<Scheduler>>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub lanes: Option<Vec<LaneStatus>>,
    pub scheduler: Option<SchedulerStatus>,
}

/// Build the Axum router with health and status routes.
pub fn status_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "content-pipeline"
    }))
}

async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(StatusResponse {
        lanes: state.dispatcher.as_ref().map(|d| d.statuses()),
        scheduler: state.scheduler.as_ref().map(|s| s.status()),
    })
}

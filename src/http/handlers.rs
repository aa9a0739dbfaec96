use super::state::AppState;
use crate::device::MediaKinds;
use crate::error::MediaError;
use crate::session::{SessionStatus, TaskConfig, TaskSessionController};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Catalog task to run, or a new id (if not provided, generate UUID)
    pub task_id: Option<String>,

    /// Optional operator-facing title
    pub title: Option<String>,

    /// Required unless `task_id` names a catalog task
    pub duration_secs: Option<u32>,

    pub video: Option<bool>,

    pub audio: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,

    /// Session state after the failure, when the session exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Create a task session and begin recording
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    let task = match resolve_task(&state, req) {
        Ok(task) => task,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message, None),
    };
    let task_id = task.task_id.clone();

    info!("Creating session for task: {}", task_id);

    let controller = {
        let mut sessions = state.sessions.write().await;
        if sessions.contains_key(&task_id) {
            return error_response(
                StatusCode::CONFLICT,
                format!("Task {} already has a session", task_id),
                None,
            );
        }

        let controller = Arc::new(state.engine.controller(task));
        sessions.insert(task_id.clone(), Arc::clone(&controller));
        controller
    };

    if let Some(publisher) = &state.publisher {
        Arc::clone(publisher).forward(controller.subscribe());
    }

    // A failed begin keeps the session so the operator can retry the device
    match controller.begin().await {
        Ok(()) => {
            info!("Recording started for task: {}", task_id);
            (StatusCode::CREATED, Json(controller.status())).into_response()
        }
        Err(e) => media_error_response(&controller, e),
    }
}

/// POST /sessions/:task_id/end
/// Stop recording before the countdown runs out
pub async fn end_session(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    let Some(controller) = state.session(&task_id).await else {
        return not_found(&task_id);
    };

    match controller.end() {
        Ok(()) => (StatusCode::OK, Json(controller.status())).into_response(),
        Err(e) => media_error_response(&controller, e),
    }
}

/// POST /sessions/:task_id/retry
/// Retry device access after a denial, then begin recording
pub async fn retry_session(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    let Some(controller) = state.session(&task_id).await else {
        return not_found(&task_id);
    };

    info!("Retrying devices for task: {}", task_id);

    if let Err(e) = controller.retry_device().await {
        return media_error_response(&controller, e);
    }

    match controller.begin().await {
        Ok(()) => (StatusCode::OK, Json(controller.status())).into_response(),
        Err(e) => media_error_response(&controller, e),
    }
}

/// DELETE /sessions/:task_id
/// Dispose a session and release its devices
pub async fn dispose_session(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    let controller = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&task_id)
    };

    match controller {
        Some(controller) => {
            controller.dispose();
            info!("Session disposed for task: {}", task_id);
            (StatusCode::OK, Json(controller.status())).into_response()
        }
        None => not_found(&task_id),
    }
}

/// GET /sessions/:task_id/status
/// Get status of a task session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.session(&task_id).await {
        Some(controller) => (StatusCode::OK, Json(controller.status())).into_response(),
        None => not_found(&task_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_task(state: &AppState, req: CreateSessionRequest) -> Result<TaskConfig, String> {
    let known = req
        .task_id
        .as_deref()
        .and_then(|id| state.catalog.iter().find(|t| t.task_id == id))
        .cloned();

    let mut task = match known {
        Some(task) => task,
        None => {
            let duration = req
                .duration_secs
                .ok_or_else(|| "duration_secs is required for tasks outside the catalog".to_string())?;
            let task_id = req
                .task_id
                .clone()
                .unwrap_or_else(|| format!("task-{}", uuid::Uuid::new_v4()));
            TaskConfig::new(task_id, MediaKinds::BOTH, duration)
        }
    };

    if let Some(title) = req.title {
        task.title = title;
    }
    if let Some(duration) = req.duration_secs {
        task.duration_secs = duration;
    }
    if let Some(video) = req.video {
        task.video = video;
    }
    if let Some(audio) = req.audio {
        task.audio = audio;
    }

    if task.kinds().is_empty() {
        return Err(MediaError::EmptyRequest.to_string());
    }

    Ok(task)
}

fn status_code(error: &MediaError) -> StatusCode {
    match error {
        MediaError::PermissionDenied => StatusCode::FORBIDDEN,
        MediaError::DeviceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MediaError::InvalidTransition { .. } | MediaError::StreamHeld | MediaError::Aborted => {
            StatusCode::CONFLICT
        }
        MediaError::NoAudioTrack | MediaError::EmptyRequest => StatusCode::BAD_REQUEST,
    }
}

fn media_error_response(controller: &TaskSessionController, error: MediaError) -> Response {
    warn!("Task {}: {}", controller.task().task_id, error);
    error_response(status_code(&error), error.to_string(), Some(controller.status()))
}

fn error_response(code: StatusCode, error: String, status: Option<SessionStatus>) -> Response {
    (code, Json(ErrorResponse { error, status })).into_response()
}

fn not_found(task_id: &str) -> Response {
    warn!("Task {} not found", task_id);
    error_response(
        StatusCode::NOT_FOUND,
        format!("Task {} not found", task_id),
        None,
    )
}

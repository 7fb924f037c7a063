//! Axum handlers for the 7 HTTP endpoints (§6).

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use batchelor_shared::auth::SecurityContext;
use batchelor_shared::model::{FetchRequest, RunRequest};

use crate::dispatch::service::DispatchError;
use crate::http::routes::AppState;

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::Forbidden { .. } => StatusCode::FORBIDDEN,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Condition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn run_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    Json(request): Json<RunRequest>,
) -> Result<Response, DispatchError> {
    let response = state.dispatch.run_task(ctx.role, request).await?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn get_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
) -> Result<Response, DispatchError> {
    let tasks = state.dispatch.get_tasks(ctx.role).await?;
    Ok(Json(tasks).into_response())
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    Path(task_id): Path<String>,
) -> Result<Response, DispatchError> {
    let task = state.dispatch.get_task(ctx.role, &task_id).await?;
    Ok(Json(task).into_response())
}

#[derive(serde::Deserialize)]
pub struct SignalBody {
    pub signal: String,
}

pub async fn send_signal(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    Path(task_id): Path<String>,
    Json(body): Json<SignalBody>,
) -> Result<Response, DispatchError> {
    state.dispatch.send_signal(ctx.role, &task_id, &body.signal).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn fetch_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
    Json(request): Json<FetchRequest>,
) -> Result<Response, DispatchError> {
    let response = state.dispatch.fetch_task(ctx.role, request).await?;
    Ok(Json(response).into_response())
}

pub async fn get_event_types(
    State(state): State<AppState>,
    Extension(ctx): Extension<SecurityContext>,
) -> Result<Response, DispatchError> {
    let event_types = state.dispatch.get_event_types(ctx.role).await?;
    Ok(Json(event_types).into_response())
}

pub async fn alive(State(state): State<AppState>) -> Result<Response, DispatchError> {
    state.dispatch.alive().await?;
    Ok(StatusCode::OK.into_response())
}

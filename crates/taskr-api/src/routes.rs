//! HTTP handlers for the task CRUD and chat endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use taskr_core::chat::{ChatRequest, ChatResponse};
use taskr_core::models::{SortKey, StatusFilter, Task};
use taskr_core::tools::{validate_description, validate_title};

use crate::AppState;
use crate::auth::{AuthError, Identity};

/// HTTP-facing error: a status code plus a `detail` body.
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn not_found(detail: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.detail}))).into_response()
    }
}

impl From<taskr_core::Error> for ApiError {
    fn from(err: taskr_core::Error) -> Self {
        use taskr_core::Error;
        let status = match err {
            Error::Validation(_) | Error::Reference(_) | Error::UnknownTool(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Model(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match status {
            // Don't leak internals on unexpected failures.
            StatusCode::INTERNAL_SERVER_ERROR => {
                log::error!("internal error: {err}");
                "Internal server error".to_string()
            }
            _ => err.to_string(),
        };
        Self { status, detail }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::AccessDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        };
        Self {
            status,
            detail: match err {
                AuthError::AccessDenied => "Access denied: user_id mismatch".to_string(),
                AuthError::MissingCredential => {
                    "Missing or invalid authorization header".to_string()
                }
                AuthError::InvalidCredential => "Invalid credential".to_string(),
            },
        }
    }
}

#[derive(Serialize)]
pub struct RootResponse {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    status: Option<String>,
    sort: Option<String>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<String>,
    Query(params): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    identity.verify_owner(&user_id)?;

    let status = params
        .status
        .as_deref()
        .map(StatusFilter::parse)
        .unwrap_or_default();
    let sort = match params.sort.as_deref() {
        Some("title") => SortKey::Title,
        _ => SortKey::CreatedAt,
    };

    let tasks = state
        .db
        .list_tasks(&identity.owner_id, status, sort)
        .await?;
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
pub struct TaskCreate {
    title: String,
    #[serde(default)]
    description: Option<String>,
}

pub async fn create_task(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<String>,
    Json(body): Json<TaskCreate>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    identity.verify_owner(&user_id)?;

    let title = body.title.trim();
    validate_title(title)?;
    validate_description(body.description.as_deref())?;

    let task = state
        .db
        .insert_task(&identity.owner_id, title, body.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    identity: Identity,
    Path((user_id, task_id)): Path<(String, i64)>,
) -> Result<Json<Task>, ApiError> {
    identity.verify_owner(&user_id)?;

    let task = state
        .db
        .get_task(&identity.owner_id, task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
}

pub async fn update_task(
    State(state): State<AppState>,
    identity: Identity,
    Path((user_id, task_id)): Path<(String, i64)>,
    Json(body): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    identity.verify_owner(&user_id)?;

    if let Some(ref title) = body.title {
        validate_title(title.trim())?;
    }
    validate_description(body.description.as_deref())?;

    let title = body.title.as_deref().map(str::trim);
    let description = body.description.as_deref().map(Some);

    let task = state
        .db
        .update_task_fields(&identity.owner_id, task_id, title, description, body.completed)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    identity: Identity,
    Path((user_id, task_id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    identity.verify_owner(&user_id)?;

    state
        .db
        .delete_task(&identity.owner_id, task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_task(
    State(state): State<AppState>,
    identity: Identity,
    Path((user_id, task_id)): Path<(String, i64)>,
) -> Result<Json<Task>, ApiError> {
    identity.verify_owner(&user_id)?;

    let task = state
        .db
        .get_task(&identity.owner_id, task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    let updated = state
        .db
        .update_task_fields(
            &identity.owner_id,
            task_id,
            None,
            None,
            Some(!task.completed),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    Ok(Json(updated))
}

pub async fn chat(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    identity.verify_owner(&user_id)?;

    log::info!(
        "chat turn for {} (conversation: {:?})",
        identity.owner_id,
        request.conversation_id.map(|id| id.to_string())
    );

    let response = state.chat.handle_turn(&identity.owner_id, request).await?;
    Ok(Json(response))
}

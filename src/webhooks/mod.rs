//! The n8n webhook surface (spec §6): five inbound HTTP endpoints served
//! with `axum`, mirroring the teacher's `Router` + `State<Arc<_>>` +
//! `Result<Json<_>, ServerError>` handler shape (`services/memory.rs`).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::dag::DagEngine;
use crate::domain::{CoordinationMode, Priority, Task};
use crate::error::MxfError;
use crate::repository::{ChannelRepository, Repository};
use crate::task::TaskService;

pub struct AppState {
    pub tasks: TaskService,
    pub channels: Arc<dyn ChannelRepository>,
    pub dag: Arc<DagEngine>,
}

/// Wraps `MxfError` for the webhook surface's `{success:false, error,
/// message}` body shape, status-mapped per spec §7.
pub struct ServerError(MxfError);

impl From<MxfError> for ServerError {
    fn from(err: MxfError) -> Self {
        ServerError(err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub assign_to: Option<String>,
    pub priority: Option<Priority>,
    pub coordination_mode: Option<CoordinationMode>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateTaskRequest {
    #[serde(flatten)]
    pub base: CreateTaskRequest,
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventRequest {
    pub channel_id: String,
    pub event_type: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessageRequest {
    pub channel_id: String,
    pub message: String,
    pub agent_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAccepted {
    pub success: bool,
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/webhooks/n8n/task", post(create_task))
        .route("/api/webhooks/n8n/task/batch", post(create_task_batch))
        .route("/api/webhooks/n8n/event", post(receive_event))
        .route("/api/webhooks/n8n/message", post(receive_message))
        .route("/api/webhooks/n8n/health", get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn build_task(
    state: &AppState,
    request: CreateTaskRequest,
    metadata: serde_json::Value,
) -> Result<Task, ServerError> {
    if !state.channels.exists(&crate::repository::Filter::eq(
        "id",
        request.channel_id.clone(),
    )).await? {
        return Err(MxfError::NotFound(format!("channel {} not found", request.channel_id)).into());
    }

    let mut task = Task::new(
        uuid::Uuid::new_v4().to_string(),
        request.channel_id,
        request.title,
        request.description,
        request.priority.unwrap_or(Priority::Medium),
    );
    task.metadata = metadata;
    if let Some(mode) = request.coordination_mode {
        task.assignment.coordination_mode = Some(mode);
    }
    if let Some(agent_id) = &request.assign_to {
        task.assignment.assigned_agent_id = Some(agent_id.clone());
        task.assignment.assigned_agent_ids.insert(agent_id.clone());
    }
    Ok(task)
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<TaskAccepted>, ServerError> {
    let metadata = request.metadata.clone().unwrap_or(serde_json::json!({}));
    let task = build_task(&state, request, metadata).await?;
    let created = state.tasks.create(task).await?;
    Ok(Json(TaskAccepted {
        success: true,
        task_id: created.id,
    }))
}

/// Preserves `items` verbatim under `metadata.items`, per §9's open
/// question on the batch endpoint's ambiguous items/metadata relation.
async fn create_task_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchCreateTaskRequest>,
) -> Result<Json<TaskAccepted>, ServerError> {
    let mut metadata = request.base.metadata.clone().unwrap_or(serde_json::json!({}));
    if let Some(obj) = metadata.as_object_mut() {
        obj.insert("items".to_string(), serde_json::Value::Array(request.items.clone()));
    }
    let task = build_task(&state, request.base, metadata).await?;
    let created = state.tasks.create(task).await?;
    Ok(Json(TaskAccepted {
        success: true,
        task_id: created.id,
    }))
}

async fn receive_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WebhookEventRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if state
        .channels
        .find_by_id(&request.channel_id)
        .await?
        .is_none()
    {
        return Err(MxfError::NotFound(format!("channel {} not found", request.channel_id)).into());
    }
    tracing::info!(channel_id = %request.channel_id, event_type = %request.event_type, "webhook event received");
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn receive_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WebhookMessageRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if state
        .channels
        .find_by_id(&request.channel_id)
        .await?
        .is_none()
    {
        return Err(MxfError::NotFound(format!("channel {} not found", request.channel_id)).into());
    }
    tracing::info!(channel_id = %request.channel_id, "webhook message received");
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "healthy",
        service: "mxf-coordination-core",
        timestamp: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Channel;
    use crate::repository::memory::{InMemoryChannelRepository, InMemoryTaskRepository};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn state_with_channel(channel_id: &str) -> Arc<AppState> {
        let channels = Arc::new(InMemoryChannelRepository::default());
        let tasks_repo = Arc::new(InMemoryTaskRepository::default());
        let dag = Arc::new(DagEngine::new());

        channels.create(Channel::new(channel_id, "demo")).await.unwrap();

        Arc::new(AppState {
            tasks: TaskService::new(tasks_repo, dag.clone()),
            channels,
            dag,
        })
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let state = state_with_channel("c1").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/webhooks/n8n/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_task_for_unknown_channel_is_404() {
        let state = state_with_channel("c1").await;
        let app = router(state);

        let body = serde_json::json!({
            "channelId": "ghost",
            "title": "t",
            "description": "d",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webhooks/n8n/task")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

// server.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendClient, BackendError};
use crate::config::Config;
use crate::payload::{PayloadError, WebhookPayload};
use crate::webhook::{
    RejectReason, SecurityConfig, ValidationOutcome, WebhookRequest, WebhookValidator,
};

const DISPATCH_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct AppState {
    pub validator: WebhookValidator,
    pub backend: Option<BackendClient>,
    pub actions: broadcast::Sender<WebhookPayload>,
}

impl AppState {
    pub fn new(security: SecurityConfig, backend: Option<BackendClient>) -> Self {
        let (actions, _) = broadcast::channel(DISPATCH_CAPACITY);
        Self {
            validator: WebhookValidator::new(security),
            backend,
            actions,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend = match config.backend_url() {
            Some(url) => Some(BackendClient::new(url)?),
            None => {
                warn!("APP_BACKEND_WEBHOOK_URL not set; chat relay is disabled");
                None
            }
        };
        Ok(Self::new(config.security(), backend))
    }

    /// Receives every payload accepted by the webhook endpoint from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WebhookPayload> {
        self.actions.subscribe()
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(RejectReason),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("invalid request body: {0}")]
    Body(#[from] BytesRejection),

    #[error("invalid chat request: {0}")]
    InvalidChatRequest(#[source] serde_json::Error),

    #[error("backend webhook URL not configured")]
    BackendNotConfigured,

    #[error("Failed to process chat message")]
    Backend(#[from] BackendError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Payload(_) | ApiError::InvalidChatRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BackendNotConfigured | ApiError::Backend(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Backend(e) = &self {
            error!("Chat relay error: {}", e);
        }
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/webhook", post(handle_webhook).get(webhook_status))
        .route("/api/chat", post(handle_chat).delete(clear_chat))
        .route("/health", get(health_check))
        .with_state(Arc::new(state))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = WebhookRequest::new(headers, body?);

    if let ValidationOutcome::Rejected(reason) = state.validator.validate(&request) {
        return Err(ApiError::Unauthorized(reason));
    }

    let payload = WebhookPayload::parse(request.raw_body())
        .inspect_err(|e| warn!("Rejected webhook payload: {}", e))?;

    info!("Accepted webhook action: {}", payload.kind());
    dispatch(&state, payload.clone());

    Ok(Json(json!({
        "success": true,
        "received": true,
        "payload": payload,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}

fn dispatch(state: &AppState, payload: WebhookPayload) {
    if state.actions.send(payload).is_err() {
        debug!("No subscribers for webhook actions");
    }
}

async fn webhook_status() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Webhook endpoint is up",
        "timestamp": Utc::now()
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub id: String,
    pub message: ChatMessage,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub id: Uuid,
    pub role: &'static str,
    pub content: String,
    pub session_id: String,
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let request: ChatRequest =
        serde_json::from_slice(&body?).map_err(ApiError::InvalidChatRequest)?;

    let backend = state
        .backend
        .as_ref()
        .ok_or(ApiError::BackendNotConfigured)?;

    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    debug!(
        "Relaying chat message {} ({}) for session {}",
        request.message.id, request.message.role, session_id
    );
    let reply = backend
        .send_message(&session_id, &request.message.content)
        .await?;

    Ok(Json(ChatReply {
        id: Uuid::new_v4(),
        role: "assistant",
        content: reply.into_text(),
        session_id,
    }))
}

async fn clear_chat() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now()
    }))
}

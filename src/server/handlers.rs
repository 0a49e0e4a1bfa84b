//! HTTP handlers for the web front end.
//!
//! Backend calls block (reqwest blocking, ONNX), so each one runs on the
//! blocking pool.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::config::BackendConfig;
use crate::desk::Desk;
use crate::generation::{self, GenerationError};

#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<Desk>,
    pub backend: Arc<BackendConfig>,
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub bot_name: String,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub active: String,
    pub available: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SelectModelResponse {
    pub active: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Backend(String),
    Internal(String),
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::UnknownModel(_) => Self::BadRequest(e.to_string()),
            _ => Self::Backend(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Backend(m) => {
                error!("backend error: {m}");
                (StatusCode::BAD_GATEWAY, m)
            }
            Self::Internal(m) => {
                error!("internal error: {m}");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {e}")))?
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn index(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        bot_name: state.desk.persona().to_string(),
        topics: state
            .desk
            .topics()
            .labels()
            .into_iter()
            .map(String::from)
            .collect(),
        keywords: state.desk.keywords(),
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.user_input.trim().is_empty() {
        return Err(ApiError::BadRequest("user_input is required".to_string()));
    }

    let desk = state.desk.clone();
    let response = blocking(move || {
        desk.reply(&req.user_name, &req.user_input)
            .map_err(|e| ApiError::Backend(format!("{e:#}")))
    })
    .await?;

    Ok(Json(ChatResponse { response }))
}

pub async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>, ApiError> {
    let backend = state.backend.clone();
    let available = blocking(move || generation::list_models(&backend).map_err(ApiError::from)).await?;

    Ok(Json(ModelsResponse {
        active: state.desk.context().model_id(),
        available,
    }))
}

pub async fn select_model(
    State(state): State<AppState>,
    Json(req): Json<SelectModelRequest>,
) -> Result<Json<SelectModelResponse>, ApiError> {
    let model = req.model.trim().to_string();
    if model.is_empty() {
        return Err(ApiError::BadRequest("model is required".to_string()));
    }

    let ctx = state.desk.context().clone();
    let active = blocking(move || {
        ctx.reload(&model)?;
        Ok(ctx.model_id())
    })
    .await?;

    info!("Active model is now {active}");
    Ok(Json(SelectModelResponse { active }))
}

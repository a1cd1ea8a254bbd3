//! Session maintenance handlers

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use loreweaver_common::{
    errors::{AppError, Result},
    sessions::{Message, SessionMetadata},
};

/// Full history response
#[derive(Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Undo response
#[derive(Serialize)]
pub struct UndoResponse {
    pub success: bool,
    pub message: String,
    pub message_count: usize,
}

/// Edit message request
#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

/// List all session ids
pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.service.list_sessions().await?))
}

/// Session metadata
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionMetadata>> {
    Ok(Json(state.service.metadata(&session_id).await?))
}

/// Full message history
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>> {
    let messages = state.service.history(&session_id).await?;
    Ok(Json(HistoryResponse { session_id, messages }))
}

/// Remove the last exchange
pub async fn undo(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<UndoResponse>> {
    let outcome = state.service.undo(&session_id).await?;

    let message = if outcome.succeeded() {
        "Removed last exchange".to_string()
    } else {
        "Not enough messages to undo".to_string()
    };

    tracing::info!(
        session_id = %session_id,
        success = outcome.succeeded(),
        remaining = outcome.remaining(),
        "Undo requested"
    );

    Ok(Json(UndoResponse {
        success: outcome.succeeded(),
        message,
        message_count: outcome.remaining(),
    }))
}

/// Replace one message's content
pub async fn edit_message(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(String, usize)>,
    Json(request): Json<EditMessageRequest>,
) -> Result<Json<Message>> {
    request.validate().map_err(|e| AppError::InvalidArgument {
        message: e.to_string(),
        field: Some("content".to_string()),
    })?;

    let message = state.service.edit(&session_id, index, &request.content).await?;
    tracing::info!(session_id = %session_id, index, "Message edited");
    Ok(Json(message))
}

/// Markdown transcript download
pub async fn export(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse> {
    let transcript = state.service.export(&session_id).await?;
    let disposition = format!("attachment; filename=\"session-{}.md\"", session_id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        transcript,
    ))
}

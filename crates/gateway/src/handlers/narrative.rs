//! Narrative turn handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use loreweaver_common::{
    errors::{AppError, Result},
    pipeline::NarrativeResponse,
};

/// Narrative request
#[derive(Debug, Deserialize, Validate)]
pub struct NarrativeRequest {
    #[validate(length(min = 1, max = 4000))]
    pub user_input: String,

    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
}

/// Run one narrative turn
pub async fn generate_narrative(
    State(state): State<AppState>,
    Json(request): Json<NarrativeRequest>,
) -> Result<Json<NarrativeResponse>> {
    request.validate().map_err(|e| AppError::InvalidArgument {
        message: e.to_string(),
        field: None,
    })?;

    tracing::info!(
        session_id = ?request.session_id,
        input_len = request.user_input.len(),
        "Narrative request"
    );

    let response = state
        .service
        .run_pipeline(&request.user_input, request.session_id.as_deref())
        .await?;

    Ok(Json(response))
}

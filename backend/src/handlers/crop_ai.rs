//! HTTP handlers for crop-scoped AI chat

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::ChatTurn;
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to chat about a crop
#[derive(Debug, Deserialize, Validate)]
pub struct ChatMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

/// Response for a chat exchange
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub crop_name: String,
}

/// Response for the diagnostic context view
#[derive(Debug, Serialize)]
pub struct CropContextResponse {
    pub crop_id: Uuid,
    pub crop_name: String,
    pub context: String,
}

/// Response for conversation history
#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub crop_id: Uuid,
    pub messages: Vec<ChatTurn>,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Chat with the AI about a specific crop
/// POST /crops/:crop_id/chat
pub async fn chat_with_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
    Json(payload): Json<ChatMessageRequest>,
) -> AppResult<Json<ChatResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let reply = state.crop_chat.chat_with_crop(crop_id, &payload.message).await?;

    Ok(Json(ChatResponse {
        response: reply.response,
        crop_name: reply.crop_name,
    }))
}

/// Get the reconstructed conversation history for a crop
/// GET /crops/:crop_id/chat/history
pub async fn get_chat_history(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<ChatHistoryResponse>> {
    let messages = state.crop_chat.history(crop_id).await?;

    Ok(Json(ChatHistoryResponse { crop_id, messages }))
}

/// Clear the conversation history for a crop
/// DELETE /crops/:crop_id/chat/history
pub async fn clear_chat_history(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    state.crop_chat.clear_history(crop_id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        message: "Conversation history cleared".to_string(),
    }))
}

/// Get the current formatted context for a crop (diagnostic)
/// GET /crops/:crop_id/context
pub async fn get_crop_context(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<CropContextResponse>> {
    let view = state.crop_chat.get_crop_context(crop_id).await?;

    Ok(Json(CropContextResponse {
        crop_id: view.crop_id,
        crop_name: view.crop_name,
        context: view.context,
    }))
}

/// Invalidate the cached session so the next chat reassembles context
/// POST /crops/:crop_id/context/refresh
pub async fn refresh_crop_context(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    state.crop_chat.refresh_context(crop_id).await;

    Ok(Json(SuccessResponse {
        success: true,
        message: "Crop context will be reassembled on next use".to_string(),
    }))
}

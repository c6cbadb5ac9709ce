//! HTTP handlers for disease image analysis and disease chat

use axum::{
    extract::{Path, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{ChatTurn, Severity};
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to analyze a crop image
#[derive(Debug, Deserialize, Validate)]
pub struct DiseaseAnalysisRequest {
    #[validate(length(min = 1))]
    pub image_base64: String,
    pub crop_id: Uuid,
}

/// Response for an image analysis
#[derive(Debug, Serialize)]
pub struct DiseaseAnalysisResponse {
    pub disease: String,
    pub cause: String,
    pub confidence: i32,
    pub severity: Severity,
    pub precautions: Vec<String>,
    pub treatment: Vec<String>,
    pub detection_id: Uuid,
}

/// Request to chat about a detection
#[derive(Debug, Deserialize, Validate)]
pub struct DiseaseChatRequest {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

/// Response for a disease chat exchange
#[derive(Debug, Serialize)]
pub struct DiseaseChatResponse {
    pub response: String,
}

/// Response for detection chat history
#[derive(Debug, Serialize)]
pub struct DetectionChatHistoryResponse {
    pub detection_id: Uuid,
    pub messages: Vec<ChatTurn>,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct DetectionSuccessResponse {
    pub success: bool,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Analyze a crop image for diseases
/// POST /disease/analyze
pub async fn analyze_disease(
    State(state): State<AppState>,
    Json(payload): Json<DiseaseAnalysisRequest>,
) -> AppResult<Json<DiseaseAnalysisResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    if BASE64.decode(&payload.image_base64).is_err() {
        return Err(AppError::ValidationError(
            "image_base64 is not valid base64".to_string(),
        ));
    }

    let outcome = state
        .disease_ai
        .analyze_disease_image(payload.crop_id, &payload.image_base64)
        .await?;

    Ok(Json(DiseaseAnalysisResponse {
        disease: outcome.analysis.disease,
        cause: outcome.analysis.cause,
        confidence: outcome.analysis.confidence,
        severity: outcome.analysis.severity,
        precautions: outcome.analysis.precautions,
        treatment: outcome.analysis.treatment,
        detection_id: outcome.detection_id,
    }))
}

/// Chat about a specific disease detection
/// POST /disease/detections/:detection_id/chat
pub async fn chat_about_detection(
    State(state): State<AppState>,
    Path(detection_id): Path<Uuid>,
    Json(payload): Json<DiseaseChatRequest>,
) -> AppResult<Json<DiseaseChatResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let response = state
        .disease_ai
        .chat_about_disease(detection_id, &payload.message)
        .await?;

    Ok(Json(DiseaseChatResponse { response }))
}

/// Get the chat history for a detection
/// GET /disease/detections/:detection_id/chat/history
pub async fn get_detection_chat_history(
    State(state): State<AppState>,
    Path(detection_id): Path<Uuid>,
) -> AppResult<Json<DetectionChatHistoryResponse>> {
    let messages = state.disease_ai.history(detection_id).await?;

    Ok(Json(DetectionChatHistoryResponse {
        detection_id,
        messages,
    }))
}

/// Clear the chat history for a detection
/// DELETE /disease/detections/:detection_id/chat/history
pub async fn clear_detection_chat_history(
    State(state): State<AppState>,
    Path(detection_id): Path<Uuid>,
) -> AppResult<Json<DetectionSuccessResponse>> {
    state.disease_ai.clear_history(detection_id).await?;

    Ok(Json(DetectionSuccessResponse {
        success: true,
        message: "Detection chat history cleared".to_string(),
    }))
}

//! Route definitions for the Farm Advisory Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Crop AI chat
        .nest("/crops", crop_ai_routes())
        // Disease analysis and chat
        .nest("/disease", disease_routes())
}

/// Crop AI routes
fn crop_ai_routes() -> Router<AppState> {
    Router::new()
        .route("/:crop_id/chat", post(handlers::chat_with_crop))
        .route(
            "/:crop_id/chat/history",
            get(handlers::get_chat_history).delete(handlers::clear_chat_history),
        )
        .route("/:crop_id/context", get(handlers::get_crop_context))
        .route("/:crop_id/context/refresh", post(handlers::refresh_crop_context))
}

/// Disease detection routes
fn disease_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(handlers::analyze_disease))
        .route(
            "/detections/:detection_id/chat",
            post(handlers::chat_about_detection),
        )
        .route(
            "/detections/:detection_id/chat/history",
            get(handlers::get_detection_chat_history)
                .delete(handlers::clear_detection_chat_history),
        )
}

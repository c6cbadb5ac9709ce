//! Farm Advisory Platform - Backend Library
//!
//! A farming-assistant backend whose core is the crop-contextual AI
//! conversation subsystem: context assembly from recent crop history,
//! persisted multi-turn memory, prompt composition, and language-model
//! invocation with deterministic fallbacks for image analysis.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use config::Config;

use services::{CropChatService, DiseaseAiService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub crop_chat: Arc<CropChatService>,
    pub disease_ai: Arc<DiseaseAiService>,
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Farm Advisory Platform API v1.0"
}

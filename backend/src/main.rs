//! Farm Advisory Platform - Backend Server
//!
//! A farming-assistant backend exposing crop-contextual AI chat,
//! image-based disease detection, and per-detection disease conversations.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farm_advisory_backend::external::llm::{ChatModel, LlmClient};
use farm_advisory_backend::services::{
    ContextSource, CropChatService, CropContextService, DiseaseAiService,
    PgCropConversationStore, PgDetectionStore, PgDiseaseChatStore, SessionCache,
};
use farm_advisory_backend::{create_app, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "farm_advisory_backend=debug,fap_server=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Farm Advisory Platform Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Wire up the AI subsystem
    let model: Arc<dyn ChatModel> = Arc::new(LlmClient::new(&config.llm)?);
    let source: Arc<dyn ContextSource> = Arc::new(CropContextService::new(db_pool.clone()));
    let sessions = Arc::new(SessionCache::new(source));

    let crop_chat = Arc::new(CropChatService::new(
        sessions.clone(),
        model.clone(),
        Arc::new(PgCropConversationStore::new(db_pool.clone())),
    ));
    let disease_ai = Arc::new(DiseaseAiService::new(
        sessions,
        model,
        Arc::new(PgDiseaseChatStore::new(db_pool.clone())),
        Arc::new(PgDetectionStore::new(db_pool.clone())),
    ));

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        crop_chat,
        disease_ai,
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

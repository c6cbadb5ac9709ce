//! Crop chat service and session cache
//!
//! A session binds a crop to its rendered context, assembled once at
//! session creation and reused for every exchange until the session is
//! invalidated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::llm::ChatModel;
use crate::services::conversation::{run_exchange, ConversationStore};
use crate::services::crop_context::{format_context, ContextSource, CropSnapshot};
use crate::services::prompts::{crop_advisor_system_prompt, CHAT_OPTIONS};
use shared::ChatTurn;

/// An initialized per-crop chat pipeline
#[derive(Debug)]
pub struct CropSession {
    pub crop_id: Uuid,
    pub crop_name: String,
    /// Context rendered once when the session was created
    pub context: String,
}

/// Process-wide cache of initialized crop sessions
///
/// Unbounded and never auto-expired; crop counts per deployment are small.
/// Entries go stale relative to the underlying data until explicitly
/// invalidated via the context-refresh endpoint.
pub struct SessionCache {
    source: Arc<dyn ContextSource>,
    sessions: RwLock<HashMap<Uuid, Arc<CropSession>>>,
}

impl SessionCache {
    pub fn new(source: Arc<dyn ContextSource>) -> Self {
        Self {
            source,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached session for a crop, assembling one if absent
    pub async fn get_or_create(&self, crop_id: Uuid) -> AppResult<Arc<CropSession>> {
        if let Some(session) = self.sessions.read().await.get(&crop_id) {
            return Ok(session.clone());
        }

        let snapshot = self
            .source
            .crop_snapshot(crop_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Crop".to_string()))?;

        let session = Arc::new(CropSession {
            crop_id,
            crop_name: snapshot.crop.name.clone(),
            context: format_context(&snapshot, Utc::now()),
        });

        // Concurrent creators may both assemble; the first insert wins and
        // every caller gets an equivalent session.
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(crop_id).or_insert(session).clone();
        Ok(session)
    }

    /// Drop the cached session, forcing reassembly on next use
    pub async fn invalidate(&self, crop_id: Uuid) {
        self.sessions.write().await.remove(&crop_id);
    }

    /// Assemble a fresh snapshot, bypassing the cache
    pub async fn assemble_fresh(&self, crop_id: Uuid) -> AppResult<Option<CropSnapshot>> {
        self.source.crop_snapshot(crop_id).await
    }
}

/// Reply from a crop chat exchange
#[derive(Debug)]
pub struct CropChatReply {
    pub crop_name: String,
    pub response: String,
}

/// Diagnostic view of a crop's formatted context
#[derive(Debug)]
pub struct CropContextView {
    pub crop_id: Uuid,
    pub crop_name: String,
    pub context: String,
}

/// Crop-scoped conversational AI service
pub struct CropChatService {
    sessions: Arc<SessionCache>,
    model: Arc<dyn ChatModel>,
    store: Arc<dyn ConversationStore>,
}

impl CropChatService {
    /// Create a new CropChatService instance
    pub fn new(
        sessions: Arc<SessionCache>,
        model: Arc<dyn ChatModel>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            sessions,
            model,
            store,
        }
    }

    /// Chat with the crop advisor about a specific crop
    ///
    /// Model failures propagate to the caller; the exchange is persisted
    /// only when a reply was produced.
    pub async fn chat_with_crop(&self, crop_id: Uuid, message: &str) -> AppResult<CropChatReply> {
        let session = self.sessions.get_or_create(crop_id).await?;
        tracing::debug!("Crop {} chat: {}", crop_id, message);

        let response = run_exchange(
            self.store.as_ref(),
            self.model.as_ref(),
            crop_id,
            |history| crop_advisor_system_prompt(&session.context, history),
            message,
            CHAT_OPTIONS,
        )
        .await?;

        Ok(CropChatReply {
            crop_name: session.crop_name.clone(),
            response,
        })
    }

    /// Reconstructed conversation history for a crop
    pub async fn history(&self, crop_id: Uuid) -> AppResult<Vec<ChatTurn>> {
        self.store.load(crop_id).await
    }

    /// Delete the conversation history for a crop
    pub async fn clear_history(&self, crop_id: Uuid) -> AppResult<()> {
        self.store.clear(crop_id).await
    }

    /// Freshly assembled formatted context (diagnostic surface)
    pub async fn get_crop_context(&self, crop_id: Uuid) -> AppResult<CropContextView> {
        let snapshot = self
            .sessions
            .assemble_fresh(crop_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Crop".to_string()))?;

        let context = format_context(&snapshot, Utc::now());
        Ok(CropContextView {
            crop_id,
            crop_name: snapshot.crop.name.clone(),
            context,
        })
    }

    /// Invalidate the cached session after a meaningful crop-state change
    pub async fn refresh_context(&self, crop_id: Uuid) {
        self.sessions.invalidate(crop_id).await;
    }
}

//! Disease image analysis and detection-scoped chat
//!
//! Image analysis never surfaces a model failure: an unparseable reply or
//! a failed call resolves to one of two fixed fallback diagnoses so the
//! end user always receives something actionable. Disease chat, in
//! contrast, surfaces model failures like any other conversation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::llm::ChatModel;
use crate::services::conversation::{run_exchange, ConversationStore};
use crate::services::crop_chat::SessionCache;
use crate::services::prompts::{disease_analysis_request, disease_chat_system_prompt, CHAT_OPTIONS};
use shared::{ChatTurn, DiseaseAnalysis, DiseaseDetection, Severity};

/// Seam for persisting and retrieving disease detections
#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Persist an analysis result and return the new detection id
    async fn insert(&self, crop_id: Uuid, analysis: &DiseaseAnalysis) -> AppResult<Uuid>;

    /// Point lookup by detection id
    async fn get(&self, detection_id: Uuid) -> AppResult<Option<DiseaseDetection>>;
}

/// Result of an image analysis call
#[derive(Debug)]
pub struct DiseaseAnalysisOutcome {
    pub analysis: DiseaseAnalysis,
    pub detection_id: Uuid,
}

// ============================================================================
// Fallback diagnoses
// ============================================================================

/// Fixed diagnosis returned when the model reply is not valid JSON
pub fn unparseable_reply_fallback() -> DiseaseAnalysis {
    DiseaseAnalysis {
        disease: "Bacterial Leaf Blight".to_string(),
        cause: "humid weather and poor airflow".to_string(),
        confidence: 85,
        severity: Severity::Moderate,
        precautions: vec![
            "Better air circulation".to_string(),
            "Water at soil level".to_string(),
        ],
        treatment: vec!["Copper spray".to_string(), "Remove sick leaves".to_string()],
    }
}

/// Fixed diagnosis returned when the model call itself fails
pub fn failed_call_fallback() -> DiseaseAnalysis {
    DiseaseAnalysis {
        disease: "Early Blight".to_string(),
        cause: "fungal infection from wet leaves".to_string(),
        confidence: 80,
        severity: Severity::Moderate,
        precautions: vec!["Water soil only".to_string(), "Good drainage".to_string()],
        treatment: vec![
            "Fungicide spray".to_string(),
            "Remove infected parts".to_string(),
        ],
    }
}

/// Parse a model reply into the six-field analysis contract
pub fn parse_analysis(text: &str) -> Option<DiseaseAnalysis> {
    serde_json::from_str(text).ok()
}

/// Resolve a model outcome into an analysis; never an error
pub fn analysis_from_model_reply(reply: AppResult<String>) -> DiseaseAnalysis {
    match reply {
        Ok(text) => match parse_analysis(&text) {
            Some(analysis) => analysis,
            None => {
                tracing::warn!("Unparseable analysis reply, using fallback diagnosis");
                unparseable_reply_fallback()
            }
        },
        Err(err) => {
            tracing::warn!("Disease analysis call failed ({}), using fallback diagnosis", err);
            failed_call_fallback()
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Disease analysis and disease chat service
pub struct DiseaseAiService {
    sessions: Arc<SessionCache>,
    model: Arc<dyn ChatModel>,
    chats: Arc<dyn ConversationStore>,
    detections: Arc<dyn DetectionStore>,
}

impl DiseaseAiService {
    /// Create a new DiseaseAiService instance
    pub fn new(
        sessions: Arc<SessionCache>,
        model: Arc<dyn ChatModel>,
        chats: Arc<dyn ConversationStore>,
        detections: Arc<dyn DetectionStore>,
    ) -> Self {
        Self {
            sessions,
            model,
            chats,
            detections,
        }
    }

    /// Analyze a crop image for diseases
    ///
    /// Always produces a complete analysis (real or fallback) and persists
    /// it as a new detection record.
    pub async fn analyze_disease_image(
        &self,
        crop_id: Uuid,
        image_base64: &str,
    ) -> AppResult<DiseaseAnalysisOutcome> {
        let session = self.sessions.get_or_create(crop_id).await?;
        tracing::debug!(
            "Analyzing image for crop {} ({} base64 bytes)",
            crop_id,
            image_base64.len()
        );

        let request = disease_analysis_request(&session.crop_name, &session.context, image_base64);
        let analysis = analysis_from_model_reply(self.model.complete(request).await);

        let detection_id = self.detections.insert(crop_id, &analysis).await?;
        Ok(DiseaseAnalysisOutcome {
            analysis,
            detection_id,
        })
    }

    /// Chat about a specific disease detection
    ///
    /// Each detection is an independent conversation thread; model failures
    /// surface to the caller.
    pub async fn chat_about_disease(
        &self,
        detection_id: Uuid,
        message: &str,
    ) -> AppResult<String> {
        let detection = self
            .detections
            .get(detection_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Disease detection".to_string()))?;

        let session = self.sessions.get_or_create(detection.crop_id).await?;

        let detection_summary = serde_json::json!({
            "disease": detection.disease_name,
            "confidence": detection.confidence,
            "severity": detection.severity.as_str(),
        })
        .to_string();

        run_exchange(
            self.chats.as_ref(),
            self.model.as_ref(),
            detection_id,
            |_history| {
                disease_chat_system_prompt(
                    &session.crop_name,
                    &session.context,
                    &detection.disease_name,
                    &detection_summary,
                )
            },
            message,
            CHAT_OPTIONS,
        )
        .await
    }

    /// Reconstructed chat history for a detection
    pub async fn history(&self, detection_id: Uuid) -> AppResult<Vec<ChatTurn>> {
        self.chats.load(detection_id).await
    }

    /// Delete the chat history for a detection
    pub async fn clear_history(&self, detection_id: Uuid) -> AppResult<()> {
        self.chats.clear(detection_id).await
    }
}

// ============================================================================
// PostgreSQL detection store
// ============================================================================

#[derive(Debug, FromRow)]
struct DetectionRow {
    id: Uuid,
    crop_id: Uuid,
    disease_name: String,
    confidence: i32,
    severity: String,
    recommendations: Option<String>,
    detected_at: DateTime<Utc>,
}

impl From<DetectionRow> for DiseaseDetection {
    fn from(r: DetectionRow) -> Self {
        DiseaseDetection {
            id: r.id,
            crop_id: r.crop_id,
            disease_name: r.disease_name,
            confidence: r.confidence,
            severity: r.severity.parse().unwrap_or(Severity::Moderate),
            recommendations: r.recommendations,
            detected_at: r.detected_at,
        }
    }
}

/// Detection store backed by PostgreSQL
#[derive(Clone)]
pub struct PgDetectionStore {
    db: PgPool,
}

impl PgDetectionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DetectionStore for PgDetectionStore {
    async fn insert(&self, crop_id: Uuid, analysis: &DiseaseAnalysis) -> AppResult<Uuid> {
        let recommendations = serde_json::to_string(analysis).ok();

        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO disease_detections (crop_id, disease_name, confidence, severity, recommendations)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(crop_id)
        .bind(&analysis.disease)
        .bind(analysis.confidence)
        .bind(analysis.severity.as_str())
        .bind(recommendations)
        .fetch_one(&self.db)
        .await?;

        Ok(row.0)
    }

    async fn get(&self, detection_id: Uuid) -> AppResult<Option<DiseaseDetection>> {
        let row = sqlx::query_as::<_, DetectionRow>(
            r#"
            SELECT id, crop_id, disease_name, confidence, severity, recommendations, detected_at
            FROM disease_detections
            WHERE id = $1
            "#,
        )
        .bind(detection_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(DiseaseDetection::from))
    }
}

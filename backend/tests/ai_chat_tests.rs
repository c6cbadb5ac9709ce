//! AI chat pipeline integration tests
//!
//! Exercises the full exchange pipeline (session cache, prompt
//! composition, model invocation, turn-pair persistence) against an
//! in-memory conversation store, a scripted model, and a fixture context
//! source.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use farm_advisory_backend::error::{AppError, AppResult};
use farm_advisory_backend::external::llm::{ChatModel, CompletionRequest, MessageContent};
use farm_advisory_backend::services::crop_chat::{CropChatService, SessionCache};
use farm_advisory_backend::services::crop_context::{ContextSource, CropSnapshot};
use farm_advisory_backend::services::disease_ai::DiseaseAiService;
use farm_advisory_backend::services::{ConversationStore, DetectionStore};
use shared::{ChatRole, ChatTurn, Crop, DiseaseAnalysis, DiseaseDetection, Severity};

// ============================================================================
// Test doubles
// ============================================================================

/// In-memory conversation store keeping pairs in commit order
#[derive(Default)]
struct MemoryConversationStore {
    pairs: Mutex<Vec<(Uuid, String, String)>>,
}

impl MemoryConversationStore {
    fn pair_count(&self, scope: Uuid) -> usize {
        self.pairs
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == scope)
            .count()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, scope: Uuid) -> AppResult<Vec<ChatTurn>> {
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == scope)
            .flat_map(|(_, user, assistant)| {
                [ChatTurn::user(user.clone()), ChatTurn::assistant(assistant.clone())]
            })
            .collect())
    }

    async fn append_pair(
        &self,
        scope: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> AppResult<()> {
        self.pairs
            .lock()
            .unwrap()
            .push((scope, user_text.to_string(), assistant_text.to_string()));
        Ok(())
    }

    async fn clear(&self, scope: Uuid) -> AppResult<()> {
        self.pairs.lock().unwrap().retain(|(s, _, _)| *s != scope);
        Ok(())
    }
}

/// Scripted model returning queued replies and capturing every request
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn with_replies(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn captured_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> AppResult<String> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AppError::LlmError(message)),
            None => Ok("scripted reply".to_string()),
        }
    }
}

/// Fixture context source serving canned snapshots
struct FixtureContextSource {
    snapshots: HashMap<Uuid, CropSnapshot>,
}

impl FixtureContextSource {
    fn with_crop(snapshot: CropSnapshot) -> Self {
        let mut snapshots = HashMap::new();
        snapshots.insert(snapshot.crop.id, snapshot);
        Self { snapshots }
    }
}

#[async_trait]
impl ContextSource for FixtureContextSource {
    async fn crop_snapshot(&self, crop_id: Uuid) -> AppResult<Option<CropSnapshot>> {
        Ok(self.snapshots.get(&crop_id).cloned())
    }
}

/// In-memory detection store
#[derive(Default)]
struct MemoryDetectionStore {
    detections: Mutex<HashMap<Uuid, DiseaseDetection>>,
}

impl MemoryDetectionStore {
    fn with_detection(detection: DiseaseDetection) -> Self {
        let store = Self::default();
        store
            .detections
            .lock()
            .unwrap()
            .insert(detection.id, detection);
        store
    }

    fn get_sync(&self, id: Uuid) -> Option<DiseaseDetection> {
        self.detections.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl DetectionStore for MemoryDetectionStore {
    async fn insert(&self, crop_id: Uuid, analysis: &DiseaseAnalysis) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.detections.lock().unwrap().insert(
            id,
            DiseaseDetection {
                id,
                crop_id,
                disease_name: analysis.disease.clone(),
                confidence: analysis.confidence,
                severity: analysis.severity,
                recommendations: serde_json::to_string(analysis).ok(),
                detected_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get(&self, detection_id: Uuid) -> AppResult<Option<DiseaseDetection>> {
        Ok(self.detections.lock().unwrap().get(&detection_id).cloned())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn bare_crop(crop_id: Uuid) -> Crop {
    Crop {
        id: crop_id,
        user_id: Uuid::new_v4(),
        name: "Tomato".to_string(),
        variety: None,
        area: None,
        location: None,
        district: None,
        state: None,
        planting_date: None,
        harvest_date: None,
        notes: None,
        created_at: Utc::now(),
    }
}

fn empty_snapshot(crop_id: Uuid) -> CropSnapshot {
    CropSnapshot {
        crop: bare_crop(crop_id),
        activities: vec![],
        diseases: vec![],
        weather: vec![],
    }
}

struct CropChatHarness {
    service: CropChatService,
    store: Arc<MemoryConversationStore>,
    model: Arc<ScriptedModel>,
}

fn crop_chat_harness(crop_id: Uuid, replies: Vec<Result<String, String>>) -> CropChatHarness {
    let source = Arc::new(FixtureContextSource::with_crop(empty_snapshot(crop_id)));
    let sessions = Arc::new(SessionCache::new(source));
    let store = Arc::new(MemoryConversationStore::default());
    let model = Arc::new(ScriptedModel::with_replies(replies));

    CropChatHarness {
        service: CropChatService::new(sessions, model.clone(), store.clone()),
        store,
        model,
    }
}

fn system_prompt_of(request: &CompletionRequest) -> &str {
    match &request.messages[0].content {
        MessageContent::Text(text) => text,
        other => panic!("expected text system prompt, got {:?}", other),
    }
}

fn assert_alternating(turns: &[ChatTurn]) {
    assert_eq!(turns.len() % 2, 0, "history must be even-length");
    for (i, turn) in turns.iter().enumerate() {
        let expected = if i % 2 == 0 {
            ChatRole::User
        } else {
            ChatRole::Assistant
        };
        assert_eq!(turn.role, expected, "turn {} has wrong role", i);
    }
}

// ============================================================================
// Crop chat
// ============================================================================

/// Chat against a crop with zero history: the composed context carries all
/// three fallback lines and exactly one pair is committed
#[tokio::test]
async fn test_chat_with_empty_history_crop() {
    let crop_id = Uuid::new_v4();
    let harness = crop_chat_harness(
        crop_id,
        vec![Ok("Your crop looks healthy so far!".to_string())],
    );

    let reply = harness
        .service
        .chat_with_crop(crop_id, "How's my crop?")
        .await
        .unwrap();

    assert_eq!(reply.crop_name, "Tomato");
    assert_eq!(reply.response, "Your crop looks healthy so far!");

    let requests = harness.model.captured_requests();
    assert_eq!(requests.len(), 1);
    let system = system_prompt_of(&requests[0]);
    assert!(system.contains("- No recent activities recorded"));
    assert!(system.contains("- No diseases detected"));
    assert!(system.contains("- No weather alerts"));

    let history = harness.service.history(crop_id).await.unwrap();
    assert_eq!(
        history,
        vec![
            ChatTurn::user("How's my crop?"),
            ChatTurn::assistant("Your crop looks healthy so far!"),
        ]
    );
}

/// A failed model call persists nothing; the next success starts cleanly
#[tokio::test]
async fn test_failed_model_call_persists_no_pair() {
    let crop_id = Uuid::new_v4();
    let harness = crop_chat_harness(
        crop_id,
        vec![
            Err("gateway timeout".to_string()),
            Ok("Water early in the morning.".to_string()),
        ],
    );

    let err = harness
        .service
        .chat_with_crop(crop_id, "When should I water?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LlmError(_)));
    assert_eq!(harness.store.pair_count(crop_id), 0);

    harness
        .service
        .chat_with_crop(crop_id, "When should I water?")
        .await
        .unwrap();

    let history = harness.service.history(crop_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_alternating(&history);
}

/// Sequential exchanges load back in commit order, oldest first
#[tokio::test]
async fn test_history_preserves_commit_order() {
    let crop_id = Uuid::new_v4();
    let harness = crop_chat_harness(
        crop_id,
        vec![
            Ok("reply one".to_string()),
            Ok("reply two".to_string()),
            Ok("reply three".to_string()),
        ],
    );

    for question in ["first?", "second?", "third?"] {
        harness.service.chat_with_crop(crop_id, question).await.unwrap();
    }

    let history = harness.service.history(crop_id).await.unwrap();
    assert_eq!(history.len(), 6);
    assert_alternating(&history);
    assert_eq!(history[0].content, "first?");
    assert_eq!(history[1].content, "reply one");
    assert_eq!(history[4].content, "third?");
    assert_eq!(history[5].content, "reply three");
}

/// Earlier turns appear in the composed request before the new message
#[tokio::test]
async fn test_prior_turns_are_replayed_to_the_model() {
    let crop_id = Uuid::new_v4();
    let harness = crop_chat_harness(
        crop_id,
        vec![Ok("Use compost.".to_string()), Ok("Twice a month.".to_string())],
    );

    harness
        .service
        .chat_with_crop(crop_id, "What fertilizer?")
        .await
        .unwrap();
    harness
        .service
        .chat_with_crop(crop_id, "How often?")
        .await
        .unwrap();

    let requests = harness.model.captured_requests();
    let second = &requests[1];
    // system + 2 history turns + new user message
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.messages[1].role, "user");
    assert_eq!(second.messages[2].role, "assistant");
    assert_eq!(second.messages[3].role, "user");
    let system = system_prompt_of(second);
    assert!(system.contains("user: What fertilizer?"));
    assert!(system.contains("assistant: Use compost."));
}

/// Clearing history twice leaves zero pairs and does not error
#[tokio::test]
async fn test_clear_history_is_idempotent() {
    let crop_id = Uuid::new_v4();
    let harness = crop_chat_harness(crop_id, vec![Ok("ok".to_string())]);

    harness.service.chat_with_crop(crop_id, "hello").await.unwrap();
    assert_eq!(harness.store.pair_count(crop_id), 1);

    harness.service.clear_history(crop_id).await.unwrap();
    assert!(harness.service.history(crop_id).await.unwrap().is_empty());

    harness.service.clear_history(crop_id).await.unwrap();
    assert!(harness.service.history(crop_id).await.unwrap().is_empty());
}

/// Chat against an unknown crop surfaces NotFound
#[tokio::test]
async fn test_chat_with_missing_crop_is_not_found() {
    let harness = crop_chat_harness(Uuid::new_v4(), vec![]);

    let err = harness
        .service
        .chat_with_crop(Uuid::new_v4(), "anyone there?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Disease analysis and chat
// ============================================================================

struct DiseaseHarness {
    service: DiseaseAiService,
    chats: Arc<MemoryConversationStore>,
    detections: Arc<MemoryDetectionStore>,
}

fn disease_harness(
    crop_id: Uuid,
    detections: MemoryDetectionStore,
    replies: Vec<Result<String, String>>,
) -> DiseaseHarness {
    let source = Arc::new(FixtureContextSource::with_crop(empty_snapshot(crop_id)));
    let sessions = Arc::new(SessionCache::new(source));
    let chats = Arc::new(MemoryConversationStore::default());
    let detections = Arc::new(detections);

    DiseaseHarness {
        service: DiseaseAiService::new(
            sessions,
            Arc::new(ScriptedModel::with_replies(replies)),
            chats.clone(),
            detections.clone(),
        ),
        chats,
        detections,
    }
}

fn sample_detection(crop_id: Uuid) -> DiseaseDetection {
    DiseaseDetection {
        id: Uuid::new_v4(),
        crop_id,
        disease_name: "Early Blight".to_string(),
        confidence: 80,
        severity: Severity::Moderate,
        recommendations: None,
        detected_at: Utc::now(),
    }
}

/// A model failure during analysis yields the Early Blight fallback,
/// persisted like a real result
#[tokio::test]
async fn test_analysis_fallback_on_model_failure() {
    let crop_id = Uuid::new_v4();
    let harness = disease_harness(
        crop_id,
        MemoryDetectionStore::default(),
        vec![Err("connection refused".to_string())],
    );

    let outcome = harness
        .service
        .analyze_disease_image(crop_id, "aGVsbG8=")
        .await
        .unwrap();

    assert_eq!(outcome.analysis.disease, "Early Blight");
    assert_eq!(outcome.analysis.confidence, 80);

    let stored = harness.detections.get_sync(outcome.detection_id).unwrap();
    assert_eq!(stored.disease_name, "Early Blight");
    assert_eq!(stored.crop_id, crop_id);
}

/// An unparseable reply yields the Bacterial Leaf Blight fallback
#[tokio::test]
async fn test_analysis_fallback_on_unparseable_reply() {
    let crop_id = Uuid::new_v4();
    let harness = disease_harness(
        crop_id,
        MemoryDetectionStore::default(),
        vec![Ok("Sorry, I cannot analyze this image.".to_string())],
    );

    let outcome = harness
        .service
        .analyze_disease_image(crop_id, "aGVsbG8=")
        .await
        .unwrap();

    assert_eq!(outcome.analysis.disease, "Bacterial Leaf Blight");
    assert_eq!(outcome.analysis.confidence, 85);
}

/// A well-formed model reply is stored as-is
#[tokio::test]
async fn test_analysis_stores_model_result() {
    let crop_id = Uuid::new_v4();
    let reply = r#"{
        "disease": "Leaf Curl",
        "cause": "viral infection via whiteflies",
        "confidence": 88,
        "severity": "High",
        "precautions": ["Use insect netting"],
        "treatment": ["Remove infected plants"]
    }"#;
    let harness = disease_harness(
        crop_id,
        MemoryDetectionStore::default(),
        vec![Ok(reply.to_string())],
    );

    let outcome = harness
        .service
        .analyze_disease_image(crop_id, "aGVsbG8=")
        .await
        .unwrap();

    assert_eq!(outcome.analysis.disease, "Leaf Curl");
    let stored = harness.detections.get_sync(outcome.detection_id).unwrap();
    assert_eq!(stored.confidence, 88);
    assert_eq!(stored.severity, Severity::High);
}

/// Two sequential exchanges on one detection produce four strictly
/// alternating turns
#[tokio::test]
async fn test_detection_chat_thread_alternates() {
    let crop_id = Uuid::new_v4();
    let detection = sample_detection(crop_id);
    let detection_id = detection.id;
    let harness = disease_harness(
        crop_id,
        MemoryDetectionStore::with_detection(detection),
        vec![
            Ok("It spreads in wet weather.".to_string()),
            Ok("Spray every 7-10 days.".to_string()),
        ],
    );

    harness
        .service
        .chat_about_disease(detection_id, "How does it spread?")
        .await
        .unwrap();
    harness
        .service
        .chat_about_disease(detection_id, "How often do I spray?")
        .await
        .unwrap();

    let history = harness.service.history(detection_id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_alternating(&history);
    assert_eq!(history[0].content, "How does it spread?");
    assert_eq!(history[3].content, "Spray every 7-10 days.");
}

/// Disease chat for an unknown detection surfaces NotFound
#[tokio::test]
async fn test_detection_chat_missing_detection() {
    let crop_id = Uuid::new_v4();
    let harness = disease_harness(crop_id, MemoryDetectionStore::default(), vec![]);

    let err = harness
        .service
        .chat_about_disease(Uuid::new_v4(), "what is this?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(harness.chats.pair_count(crop_id), 0);
}

/// Disease chat failures surface instead of fabricating a reply
#[tokio::test]
async fn test_detection_chat_surfaces_model_failure() {
    let crop_id = Uuid::new_v4();
    let detection = sample_detection(crop_id);
    let detection_id = detection.id;
    let harness = disease_harness(
        crop_id,
        MemoryDetectionStore::with_detection(detection),
        vec![Err("bad gateway".to_string())],
    );

    let err = harness
        .service
        .chat_about_disease(detection_id, "help?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LlmError(_)));
    assert!(harness.service.history(detection_id).await.unwrap().is_empty());
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Any sequence of exchanges (some failing) leaves an even-length,
    /// strictly alternating history containing only the successful pairs
    #[test]
    fn prop_history_always_alternates(
        outcomes in prop::collection::vec(
            ("[a-z ]{1,20}", prop::bool::ANY),
            1..12,
        )
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let crop_id = Uuid::new_v4();
            let replies = outcomes
                .iter()
                .map(|(text, succeeds)| {
                    if *succeeds {
                        Ok(format!("re: {}", text))
                    } else {
                        Err("model unavailable".to_string())
                    }
                })
                .collect();
            let harness = crop_chat_harness(crop_id, replies);

            let mut expected_pairs = 0;
            for (text, succeeds) in &outcomes {
                let result = harness.service.chat_with_crop(crop_id, text).await;
                if *succeeds {
                    result.unwrap();
                    expected_pairs += 1;
                } else {
                    result.unwrap_err();
                }
            }

            let history = harness.service.history(crop_id).await.unwrap();
            assert_eq!(history.len(), expected_pairs * 2);
            assert_alternating(&history);
        });
    }
}

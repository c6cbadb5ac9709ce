//! Persisted conversation memory
//!
//! Conversations are stored as user/assistant pairs — never as loose
//! messages — scoped either to a crop or to a disease detection. A pair is
//! appended only after the model reply arrives, so a failed model call
//! leaves nothing behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use crate::external::llm::{ChatModel, CompletionOptions};
use crate::services::prompts::compose_chat_request;
use shared::ChatTurn;

/// Seam for a scope-keyed conversation store
///
/// The scope key partitions history into independent threads: a crop id
/// for crop-advisor chats, a detection id for disease chats.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Reconstruct the ordered history for a scope, oldest first
    ///
    /// Every persisted pair expands to exactly two turns, user then
    /// assistant, so the result is always even-length and alternating.
    async fn load(&self, scope: Uuid) -> AppResult<Vec<ChatTurn>>;

    /// Persist one completed user/assistant pair
    async fn append_pair(&self, scope: Uuid, user_text: &str, assistant_text: &str)
        -> AppResult<()>;

    /// Delete all pairs for a scope; idempotent
    async fn clear(&self, scope: Uuid) -> AppResult<()>;
}

/// Run one complete chat exchange: load history, compose, invoke, commit
///
/// The user message lives in this call's scope until the model reply
/// arrives; on model failure the error propagates and no partial pair is
/// persisted.
pub async fn run_exchange<F>(
    store: &dyn ConversationStore,
    model: &dyn ChatModel,
    scope: Uuid,
    make_system_prompt: F,
    user_text: &str,
    options: CompletionOptions,
) -> AppResult<String>
where
    F: FnOnce(&[ChatTurn]) -> String,
{
    let history = store.load(scope).await?;
    let system_prompt = make_system_prompt(history.as_slice());
    let request = compose_chat_request(system_prompt, history.as_slice(), user_text, options);

    let reply = model.complete(request).await?;
    store.append_pair(scope, user_text, &reply).await?;

    Ok(reply)
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct CropConversationRow {
    #[allow(dead_code)]
    id: Uuid,
    #[allow(dead_code)]
    crop_id: Uuid,
    message: String,
    response: String,
    #[allow(dead_code)]
    context_used: Option<String>,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DiseaseChatRow {
    #[allow(dead_code)]
    id: Uuid,
    #[allow(dead_code)]
    detection_id: Uuid,
    message: String,
    response: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

/// Decode a stored message field that may hold either a plain string or a
/// JSON-encoded string array (legacy rows); malformed JSON falls back to
/// the raw value as a single message
fn expand_legacy_field(raw: &str) -> Vec<String> {
    if raw.starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| vec![raw.to_string()])
    } else {
        vec![raw.to_string()]
    }
}

fn expand_crop_rows(rows: Vec<CropConversationRow>) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        for message in expand_legacy_field(&row.message) {
            turns.push(ChatTurn::user(message));
        }
        for response in expand_legacy_field(&row.response) {
            turns.push(ChatTurn::assistant(response));
        }
    }
    turns
}

fn expand_disease_rows(rows: Vec<DiseaseChatRow>) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        turns.push(ChatTurn::user(row.message));
        turns.push(ChatTurn::assistant(row.response));
    }
    turns
}

// ============================================================================
// PostgreSQL stores
// ============================================================================

/// Crop-scoped conversation store backed by PostgreSQL
#[derive(Clone)]
pub struct PgCropConversationStore {
    db: PgPool,
}

impl PgCropConversationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for PgCropConversationStore {
    async fn load(&self, scope: Uuid) -> AppResult<Vec<ChatTurn>> {
        let rows = sqlx::query_as::<_, CropConversationRow>(
            r#"
            SELECT id, crop_id, message, response, context_used, created_at
            FROM crop_conversations
            WHERE crop_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(scope)
        .fetch_all(&self.db)
        .await?;

        Ok(expand_crop_rows(rows))
    }

    async fn append_pair(
        &self,
        scope: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO crop_conversations (crop_id, message, response, context_used)
            VALUES ($1, $2, $3, NULL)
            "#,
        )
        .bind(scope)
        .bind(user_text)
        .bind(assistant_text)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn clear(&self, scope: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM crop_conversations WHERE crop_id = $1")
            .bind(scope)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

/// Detection-scoped conversation store backed by PostgreSQL
#[derive(Clone)]
pub struct PgDiseaseChatStore {
    db: PgPool,
}

impl PgDiseaseChatStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for PgDiseaseChatStore {
    async fn load(&self, scope: Uuid) -> AppResult<Vec<ChatTurn>> {
        let rows = sqlx::query_as::<_, DiseaseChatRow>(
            r#"
            SELECT id, detection_id, message, response, created_at
            FROM disease_chat_history
            WHERE detection_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(scope)
        .fetch_all(&self.db)
        .await?;

        Ok(expand_disease_rows(rows))
    }

    async fn append_pair(
        &self,
        scope: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO disease_chat_history (detection_id, message, response)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(scope)
        .bind(user_text)
        .bind(assistant_text)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn clear(&self, scope: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM disease_chat_history WHERE detection_id = $1")
            .bind(scope)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ChatRole;

    fn crop_row(message: &str, response: &str) -> CropConversationRow {
        CropConversationRow {
            id: Uuid::new_v4(),
            crop_id: Uuid::new_v4(),
            message: message.to_string(),
            response: response.to_string(),
            context_used: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expand_legacy_field_plain_string() {
        assert_eq!(expand_legacy_field("hello"), vec!["hello".to_string()]);
    }

    #[test]
    fn test_expand_legacy_field_json_array() {
        assert_eq!(
            expand_legacy_field(r#"["first", "second"]"#),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    /// Malformed JSON falls back to the raw value as a single message
    #[test]
    fn test_expand_legacy_field_malformed_json() {
        assert_eq!(
            expand_legacy_field("[not valid json"),
            vec!["[not valid json".to_string()]
        );
    }

    /// Each pair expands to user-then-assistant regardless of storage order
    #[test]
    fn test_expand_crop_rows_ordering() {
        let rows = vec![crop_row("How much water?", "Twice a week."), crop_row("And fertilizer?", "Monthly.")];

        let turns = expand_crop_rows(rows);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], ChatTurn::user("How much water?"));
        assert_eq!(turns[1], ChatTurn::assistant("Twice a week."));
        assert_eq!(turns[2], ChatTurn::user("And fertilizer?"));
        assert_eq!(turns[3], ChatTurn::assistant("Monthly."));
    }

    /// Legacy array rows expand in place without breaking later pairs
    #[test]
    fn test_expand_crop_rows_legacy_array() {
        let rows = vec![
            crop_row(r#"["first", "second"]"#, r#"["reply one", "reply two"]"#),
            crop_row("third", "reply three"),
        ];

        let turns = expand_crop_rows(rows);
        assert_eq!(turns.len(), 6);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].content, "second");
        assert_eq!(turns[2], ChatTurn::assistant("reply one"));
        assert_eq!(turns[3], ChatTurn::assistant("reply two"));
        assert_eq!(turns[4], ChatTurn::user("third"));
        assert_eq!(turns[5], ChatTurn::assistant("reply three"));
    }

    #[test]
    fn test_expand_disease_rows_alternating() {
        let rows = vec![
            DiseaseChatRow {
                id: Uuid::new_v4(),
                detection_id: Uuid::new_v4(),
                message: "Is it contagious?".to_string(),
                response: "It spreads through splashing water.".to_string(),
                created_at: Utc::now(),
            },
            DiseaseChatRow {
                id: Uuid::new_v4(),
                detection_id: Uuid::new_v4(),
                message: "How do I treat it?".to_string(),
                response: "Apply a copper-based spray.".to_string(),
                created_at: Utc::now(),
            },
        ];

        let turns = expand_disease_rows(rows);
        assert_eq!(turns.len(), 4);
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 {
                ChatRole::User
            } else {
                ChatRole::Assistant
            };
            assert_eq!(turn.role, expected);
        }
    }
}

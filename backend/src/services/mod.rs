//! Business logic services for the Farm Advisory Platform

pub mod conversation;
pub mod crop_chat;
pub mod crop_context;
pub mod disease_ai;
pub mod prompts;

pub use conversation::{ConversationStore, PgCropConversationStore, PgDiseaseChatStore};
pub use crop_chat::{CropChatService, SessionCache};
pub use crop_context::{ContextSource, CropContextService};
pub use disease_ai::{DetectionStore, DiseaseAiService, PgDetectionStore};

//! External service clients

pub mod llm;

pub use llm::{ChatModel, LlmClient};

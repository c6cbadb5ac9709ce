//! Conversation models

use serde::{Deserialize, Serialize};

use crate::types::ChatRole;

/// A single message in a reconstructed conversation
///
/// Histories are stored as user/assistant pairs and expand to an
/// even-length, strictly alternating sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

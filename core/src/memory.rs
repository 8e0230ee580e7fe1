//! Conversation turns and follow-up entity recall.
//!
//! The engine itself is stateless; callers own the turn history and pass it
//! back in on every request. Recall re-derives entity mentions from the most
//! recent turns so follow-up questions ("tell me more about them") resolve
//! against what was just discussed.

use serde::{Deserialize, Serialize};

use crate::entities::{EntityExtractor, ExtractedEntities};

/// How many trailing turns are scanned for carried-forward entities.
pub const HISTORY_RECALL_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation turn. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Derives entity mentions from recent history.
pub struct ConversationMemory {
    window: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self {
            window: HISTORY_RECALL_WINDOW,
        }
    }
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Extract and union entity mentions from the last `window` turns.
    ///
    /// Crime types are not carried across turns; only locations, persons and
    /// organizations resolve follow-up references. The result is merged with
    /// (never replaces) entities from the current question.
    pub async fn recall(&self, extractor: &EntityExtractor, history: &[Turn]) -> ExtractedEntities {
        let mut recalled = ExtractedEntities::default();
        let start = history.len().saturating_sub(self.window);
        for turn in &history[start..] {
            let mut mentions = extractor.extract(&turn.content).await;
            mentions.crime_types.clear();
            recalled.merge(mentions);
        }
        recalled
    }
}

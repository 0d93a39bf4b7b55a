use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::participant::SessionUser;

/// Closed set of reaction kinds a message can carry.
///
/// Anything outside this enumeration is rejected as an invalid argument
/// before it reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    ThumbsUp,
    Heart,
    Clap,
    Laugh,
    Surprised,
    Fire,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 6] = [
        ReactionKind::ThumbsUp,
        ReactionKind::Heart,
        ReactionKind::Clap,
        ReactionKind::Laugh,
        ReactionKind::Surprised,
        ReactionKind::Fire,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thumbs_up" => Some(Self::ThumbsUp),
            "heart" => Some(Self::Heart),
            "clap" => Some(Self::Clap),
            "laugh" => Some(Self::Laugh),
            "surprised" => Some(Self::Surprised),
            "fire" => Some(Self::Fire),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThumbsUp => "thumbs_up",
            Self::Heart => "heart",
            Self::Clap => "clap",
            Self::Laugh => "laugh",
            Self::Surprised => "surprised",
            Self::Fire => "fire",
        }
    }
}

/// Chat message record as persisted in the `chat_messages` collection.
///
/// Body text is non-empty at creation; profanity redaction is applied exactly
/// once, before insert. Messages are never hard-deleted — `deleted` flips and
/// the body is retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub text: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub reactions: HashMap<ReactionKind, u32>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_by: Option<Uuid>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Visibility rule: public messages are visible to everyone; private ones
    /// only to their sender, their recipient, or a privileged viewer.
    pub fn visible_to(&self, viewer: &SessionUser) -> bool {
        if !self.is_private || viewer.role.is_privileged() {
            return true;
        }
        self.sender_id == viewer.user_id || self.recipient_id == Some(viewer.user_id)
    }

    pub fn reaction_total(&self) -> u32 {
        self.reactions.values().sum()
    }
}

/// One react action by one user, persisted alongside the message tally so the
/// analytics engine can reconstruct who reacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReaction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

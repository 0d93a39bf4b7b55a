use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{ChatMessage, RaisedHand, ReactionKind, SessionRole};

/// Inbound WebSocket events from client to server.
///
/// The `type` discriminator selects the variant; required payload fields vary
/// by type. Unknown or missing types fail deserialization and are answered
/// with an `error` envelope to the sender only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    ChatMessage {
        message: String,
        #[serde(default)]
        is_private: bool,
        #[serde(default)]
        recipient_id: Option<Uuid>,
    },
    ReactionAdded {
        message_id: Uuid,
        reaction: String,
    },
    HandRaised,
    HandLowered {
        /// Absent = lowering one's own hand; instructors may lower others'
        #[serde(default)]
        user_id: Option<Uuid>,
    },
    TypingStart,
    TypingStop,
    DeleteMessage {
        message_id: Uuid,
    },
    MuteUser {
        user_id: Uuid,
        #[serde(default)]
        duration_minutes: Option<i64>,
        #[serde(default)]
        reason: Option<String>,
    },
    UnmuteUser {
        user_id: Uuid,
    },
}

/// Outbound WebSocket events from server to client.
///
/// Mirrors the inbound vocabulary plus lifecycle and error envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutboundEvent {
    ChatMessage {
        message: ChatMessage,
    },
    ReactionAdded {
        message_id: Uuid,
        reaction: ReactionKind,
        user_id: Uuid,
        counts: HashMap<ReactionKind, u32>,
    },
    HandRaised {
        hand: RaisedHand,
    },
    HandLowered {
        user_id: Uuid,
        lowered_by: Uuid,
    },
    TypingStart {
        user_id: Uuid,
        display_name: String,
    },
    TypingStop {
        user_id: Uuid,
    },
    MessageDeleted {
        message_id: Uuid,
        deleted_by: Uuid,
    },
    UserMuted {
        user_id: Uuid,
        #[serde(default)]
        muted_by: Option<Uuid>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
        #[serde(default)]
        reason: Option<String>,
    },
    UserUnmuted {
        user_id: Uuid,
    },
    UserJoined {
        user_id: Uuid,
        display_name: String,
        role: SessionRole,
    },
    UserLeft {
        user_id: Uuid,
    },
    Error {
        error: String,
    },
}

impl WsOutboundEvent {
    /// Serialize for the wire. Serialization of these plain enums cannot
    /// fail; the fallback keeps the signature infallible regardless.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","error":"serialization failed"}"#.to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

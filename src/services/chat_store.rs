//! Chat store adapter: message/reaction/hand-raise/attendance CRUD over the
//! document store, enforcing the domain rules the store itself does not know
//! (visibility, soft-delete, closed reaction set, raise-hand idempotence).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{AttendanceRecord, ChatMessage, ChatReaction, RaisedHand, ReactionKind, SessionUser};
use crate::store::{FindQuery, ZeroDbClient};

pub const COL_MESSAGES: &str = "chat_messages";
pub const COL_REACTIONS: &str = "chat_reactions";
pub const COL_HANDS: &str = "raised_hands";
pub const COL_ATTENDANCE: &str = "attendance";

/// Textual encodings `export_messages` can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON array of structured records
    Records,
    /// CSV rows
    Table,
    /// Human-readable transcript lines with privacy/reaction markers
    Transcript,
}

impl ExportFormat {
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "records" => Ok(Self::Records),
            "table" => Ok(Self::Table),
            "transcript" => Ok(Self::Transcript),
            other => Err(AppError::InvalidArgument(format!(
                "unsupported export format: {other}"
            ))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Records => "application/json",
            Self::Table => "text/csv; charset=utf-8",
            Self::Transcript => "text/plain; charset=utf-8",
        }
    }
}

/// One exported message in the `records` encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub text: String,
    pub private: bool,
    pub reactions: HashMap<ReactionKind, u32>,
}

/// Quote a CSV field per RFC 4180 when it needs it.
pub(crate) fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn reactions_summary(reactions: &HashMap<ReactionKind, u32>) -> String {
    let mut entries: Vec<_> = reactions.iter().filter(|(_, n)| **n > 0).collect();
    entries.sort_by_key(|(kind, _)| **kind);
    entries
        .iter()
        .map(|(kind, count)| format!("{}:{}", kind.as_str(), count))
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Clone)]
pub struct ChatStore {
    db: ZeroDbClient,
}

impl ChatStore {
    pub fn new(db: ZeroDbClient) -> Self {
        Self { db }
    }

    pub async fn insert_message(&self, message: &ChatMessage) -> AppResult<()> {
        self.db.insert_one(COL_MESSAGES, message).await?;
        Ok(())
    }

    pub async fn get_message(&self, session_id: Uuid, message_id: Uuid) -> AppResult<ChatMessage> {
        let message: ChatMessage = self.db.find_by_id(COL_MESSAGES, message_id).await?;
        if message.session_id != session_id {
            return Err(AppError::NotFound);
        }
        Ok(message)
    }

    /// Messages in creation order, soft-deleted rows excluded.
    ///
    /// Non-privileged viewers get private messages only where they are the
    /// sender or the recipient (a `$or` filter the store evaluates);
    /// privileged viewers see everything unfiltered.
    pub async fn list_messages(
        &self,
        session_id: Uuid,
        viewer: &SessionUser,
    ) -> AppResult<Vec<ChatMessage>> {
        let mut filter = json!({
            "session_id": session_id,
            "deleted": false,
        });
        if !viewer.role.is_privileged() {
            filter["$or"] = json!([
                { "is_private": false },
                { "sender_id": viewer.user_id },
                { "recipient_id": viewer.user_id },
            ]);
        }

        let query = FindQuery::filter(filter).sort_by("created_at", 1);
        Ok(self.db.find(COL_MESSAGES, &query).await?)
    }

    /// Soft delete: the flag flips, the body stays for audit.
    pub async fn soft_delete_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        deleted_by: Uuid,
    ) -> AppResult<ChatMessage> {
        let mut message = self.get_message(session_id, message_id).await?;
        let now = Utc::now();
        self.db
            .update_one(
                COL_MESSAGES,
                message_id,
                json!({ "deleted": true, "deleted_by": deleted_by, "deleted_at": now }),
            )
            .await?;
        message.deleted = true;
        message.deleted_by = Some(deleted_by);
        message.deleted_at = Some(now);
        Ok(message)
    }

    /// Bump the message tally (read-modify-write is fine at this scale) and
    /// record who reacted for the analytics read side.
    pub async fn add_reaction(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user: &SessionUser,
        kind: ReactionKind,
    ) -> AppResult<ChatMessage> {
        let mut message = self.get_message(session_id, message_id).await?;
        if message.deleted {
            return Err(AppError::NotFound);
        }

        *message.reactions.entry(kind).or_insert(0) += 1;
        self.db
            .update_one(
                COL_MESSAGES,
                message_id,
                json!({ "reactions": &message.reactions }),
            )
            .await?;

        let reaction = ChatReaction {
            id: Uuid::new_v4(),
            session_id,
            message_id,
            user_id: user.user_id,
            kind,
            created_at: Utc::now(),
        };
        self.db.insert_one(COL_REACTIONS, &reaction).await?;

        Ok(message)
    }

    async fn active_hands(&self, session_id: Uuid, user_id: Option<Uuid>) -> AppResult<Vec<RaisedHand>> {
        let mut filter = json!({ "session_id": session_id, "active": true });
        if let Some(user_id) = user_id {
            filter["user_id"] = json!(user_id);
        }
        let query = FindQuery::filter(filter).sort_by("raised_at", 1);
        Ok(self.db.find(COL_HANDS, &query).await?)
    }

    /// Raise a hand. Idempotent: an already-active hand is returned as-is,
    /// no duplicate row is created.
    pub async fn raise_hand(&self, session_id: Uuid, user: &SessionUser) -> AppResult<RaisedHand> {
        if let Some(existing) = self
            .active_hands(session_id, Some(user.user_id))
            .await?
            .into_iter()
            .next()
        {
            return Ok(existing);
        }

        let hand = RaisedHand {
            id: Uuid::new_v4(),
            session_id,
            user_id: user.user_id,
            user_name: user.display_name.clone(),
            active: true,
            raised_at: Utc::now(),
            lowered_at: None,
            acknowledged_by: None,
        };
        self.db.insert_one(COL_HANDS, &hand).await?;
        Ok(hand)
    }

    /// Lower all active hands of a user. `acknowledged_by` is set when an
    /// instructor lowers someone else's hand. Returns the rows lowered.
    pub async fn lower_hand(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        acknowledged_by: Option<Uuid>,
    ) -> AppResult<u32> {
        let hands = self.active_hands(session_id, Some(user_id)).await?;
        let now = Utc::now();
        let mut lowered = 0;
        for hand in &hands {
            self.db
                .update_one(
                    COL_HANDS,
                    hand.id,
                    json!({ "active": false, "lowered_at": now, "acknowledged_by": acknowledged_by }),
                )
                .await?;
            lowered += 1;
        }
        Ok(lowered)
    }

    pub async fn raised_hands(&self, session_id: Uuid) -> AppResult<Vec<RaisedHand>> {
        self.active_hands(session_id, None).await
    }

    pub async fn record_join(
        &self,
        session_id: Uuid,
        user: &SessionUser,
    ) -> AppResult<AttendanceRecord> {
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            session_id,
            user_id: user.user_id,
            user_name: user.display_name.clone(),
            joined_at: Utc::now(),
            left_at: None,
        };
        self.db.insert_one(COL_ATTENDANCE, &record).await?;
        Ok(record)
    }

    pub async fn record_leave(&self, attendance_id: Uuid) -> AppResult<()> {
        self.db
            .update_one(COL_ATTENDANCE, attendance_id, json!({ "left_at": Utc::now() }))
            .await?;
        Ok(())
    }

    /// Serialize the session's non-deleted messages in one of the three
    /// export encodings, optionally excluding private messages.
    pub async fn export_messages(
        &self,
        session_id: Uuid,
        format: ExportFormat,
        include_private: bool,
    ) -> AppResult<String> {
        let query = FindQuery::filter(json!({
            "session_id": session_id,
            "deleted": false,
        }))
        .sort_by("created_at", 1);
        let messages: Vec<ChatMessage> = self.db.find(COL_MESSAGES, &query).await?;

        let messages: Vec<_> = messages
            .into_iter()
            .filter(|m| include_private || !m.is_private)
            .collect();

        Ok(render_export(&messages, format))
    }
}

pub fn render_export(messages: &[ChatMessage], format: ExportFormat) -> String {
    match format {
        ExportFormat::Records => {
            let records: Vec<ExportRecord> = messages
                .iter()
                .map(|m| ExportRecord {
                    id: m.id,
                    timestamp: m.created_at,
                    sender: m.sender_name.clone(),
                    text: m.text.clone(),
                    private: m.is_private,
                    reactions: m.reactions.clone(),
                })
                .collect();
            // In-memory serialization of plain data cannot fail
            serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string())
        }
        ExportFormat::Table => {
            let mut out = String::from("message_id,timestamp,sender,private,text,reactions\n");
            for m in messages {
                out.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    m.id,
                    m.created_at.to_rfc3339(),
                    csv_field(&m.sender_name),
                    m.is_private,
                    csv_field(&m.text),
                    csv_field(&reactions_summary(&m.reactions)),
                ));
            }
            out
        }
        ExportFormat::Transcript => {
            let mut out = String::new();
            for m in messages {
                let mut line = format!(
                    "[{}] {}",
                    m.created_at.format("%Y-%m-%d %H:%M:%S"),
                    m.sender_name
                );
                if m.is_private {
                    let recipient = m.recipient_name.as_deref().unwrap_or("unknown");
                    line.push_str(&format!(" (private to {recipient})"));
                }
                line.push_str(&format!(": {}", m.text));
                let summary = reactions_summary(&m.reactions);
                if !summary.is_empty() {
                    line.push_str(&format!("  [reactions: {summary}]"));
                }
                out.push_str(&line);
                out.push('\n');
            }
            out
        }
    }
}

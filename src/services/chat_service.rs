//! Session chat orchestration: the one facade the transport layer talks to.
//!
//! Composes the rate limiter, the moderation engine and the chat store.
//! Owns no durable state of its own — only the ephemeral rate-limit/typing
//! keys in the shared cache.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CacheClient;
use crate::config::ChatLimits;
use crate::error::{AppError, AppResult};
use crate::models::{AttendanceRecord, ChatMessage, MuteRecord, RaisedHand, ReactionKind, SessionUser};
use crate::services::chat_store::{ChatStore, ExportFormat};
use crate::services::moderation::{ModerationService, ScreenedMessage};
use crate::services::rate_limiter::{RateLimitAction, RateLimiter};

/// A message accepted by `send_message`, plus the auto-mute it may have
/// triggered (the transport broadcasts both).
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: ChatMessage,
    pub auto_mute: Option<MuteRecord>,
}

/// A user currently flagged as typing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TypingUser {
    pub user_id: Uuid,
    pub display_name: String,
}

pub struct SessionChatService {
    store: ChatStore,
    moderation: ModerationService,
    limiter: RateLimiter,
    cache: CacheClient,
    limits: Arc<ChatLimits>,
}

impl SessionChatService {
    pub fn new(
        store: ChatStore,
        moderation: ModerationService,
        limiter: RateLimiter,
        cache: CacheClient,
        limits: Arc<ChatLimits>,
    ) -> Self {
        Self {
            store,
            moderation,
            limiter,
            cache,
            limits,
        }
    }

    fn typing_key(session_id: Uuid, user_id: Uuid) -> String {
        format!("chat:typing:{}:{}", session_id, user_id)
    }

    /// Send pipeline: validate → mute check → rate limit → profanity screen →
    /// persist. Not atomic across the awaits, but each step is safe to repeat.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        sender: &SessionUser,
        text: &str,
        is_private: bool,
        recipient: Option<(Uuid, String)>,
    ) -> AppResult<SentMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("message text cannot be empty".into()));
        }
        if is_private && recipient.is_none() {
            return Err(AppError::BadRequest(
                "private message requires a recipient".into(),
            ));
        }

        if let Some(mute) = self.moderation.active_mute(session_id, sender.user_id).await? {
            return Err(AppError::Muted {
                reason: mute.reason,
                expires_at: mute.expires_at,
            });
        }

        self.limiter
            .check(
                session_id,
                sender.user_id,
                RateLimitAction::Message,
                sender.role.is_privileged(),
            )
            .await?;

        let ScreenedMessage {
            text: screened_text,
            redacted,
            auto_mute,
        } = self
            .moderation
            .screen_message(session_id, sender, text)
            .await?;

        let (recipient_id, recipient_name) = match (is_private, recipient) {
            (true, Some((id, name))) => (Some(id), Some(name)),
            _ => (None, None),
        };

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            sender_id: sender.user_id,
            sender_name: sender.display_name.clone(),
            text: screened_text,
            is_private,
            recipient_id,
            recipient_name,
            reactions: Default::default(),
            deleted: false,
            deleted_by: None,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_message(&message).await?;

        if redacted {
            tracing::info!(
                session_id = %session_id,
                sender_id = %sender.user_id,
                message_id = %message.id,
                "message stored with profanity redacted"
            );
        }

        Ok(SentMessage { message, auto_mute })
    }

    pub async fn list_messages(
        &self,
        session_id: Uuid,
        viewer: &SessionUser,
    ) -> AppResult<Vec<ChatMessage>> {
        self.store.list_messages(session_id, viewer).await
    }

    pub async fn delete_message(
        &self,
        session_id: Uuid,
        actor: &SessionUser,
        message_id: Uuid,
    ) -> AppResult<ChatMessage> {
        if !actor.role.is_privileged() {
            return Err(AppError::Forbidden);
        }
        self.store
            .soft_delete_message(session_id, message_id, actor.user_id)
            .await
    }

    pub async fn add_reaction(
        &self,
        session_id: Uuid,
        user: &SessionUser,
        message_id: Uuid,
        reaction: &str,
    ) -> AppResult<(ChatMessage, ReactionKind)> {
        let kind = ReactionKind::parse(reaction)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown reaction: {reaction}")))?;

        self.limiter
            .check(
                session_id,
                user.user_id,
                RateLimitAction::Reaction,
                user.role.is_privileged(),
            )
            .await?;

        let message = self
            .store
            .add_reaction(session_id, message_id, user, kind)
            .await?;
        Ok((message, kind))
    }

    pub async fn mute_user(
        &self,
        session_id: Uuid,
        actor: &SessionUser,
        target_user_id: Uuid,
        duration_minutes: Option<i64>,
        reason: Option<String>,
    ) -> AppResult<MuteRecord> {
        self.moderation
            .mute(session_id, target_user_id, actor, duration_minutes, reason)
            .await
    }

    pub async fn unmute_user(
        &self,
        session_id: Uuid,
        actor: &SessionUser,
        target_user_id: Uuid,
    ) -> AppResult<u32> {
        self.moderation.unmute(session_id, target_user_id, actor).await
    }

    pub async fn raise_hand(
        &self,
        session_id: Uuid,
        user: &SessionUser,
    ) -> AppResult<RaisedHand> {
        self.store.raise_hand(session_id, user).await
    }

    /// Lower a hand. Lowering someone else's hand is an instructor
    /// acknowledgement and requires a privileged role.
    pub async fn lower_hand(
        &self,
        session_id: Uuid,
        actor: &SessionUser,
        target_user_id: Uuid,
    ) -> AppResult<u32> {
        let acknowledged_by = if target_user_id == actor.user_id {
            None
        } else {
            if !actor.role.is_privileged() {
                return Err(AppError::Forbidden);
            }
            Some(actor.user_id)
        };
        self.store
            .lower_hand(session_id, target_user_id, acknowledged_by)
            .await
    }

    pub async fn raised_hands(&self, session_id: Uuid) -> AppResult<Vec<RaisedHand>> {
        self.store.raised_hands(session_id).await
    }

    /// Flag the user as typing. Lossy by design: the flag self-expires after
    /// a few seconds, so a lost "stop" is only briefly visible.
    pub async fn typing_started(&self, session_id: Uuid, user: &SessionUser) {
        let key = Self::typing_key(session_id, user.user_id);
        if let Err(e) = self
            .cache
            .set_with_ttl(&key, &user.display_name, self.limits.typing_ttl_secs)
            .await
        {
            tracing::warn!(error = %e, "failed to set typing flag");
        }
    }

    pub async fn typing_stopped(&self, session_id: Uuid, user_id: Uuid) {
        let key = Self::typing_key(session_id, user_id);
        if let Err(e) = self.cache.delete(&key).await {
            tracing::warn!(error = %e, "failed to clear typing flag");
        }
    }

    /// Users currently typing. Degrades to empty when the cache is away.
    pub async fn typing_users(&self, session_id: Uuid) -> Vec<TypingUser> {
        let pattern = format!("chat:typing:{}:*", session_id);
        let keys = match self.cache.keys_matching(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list typing flags");
                return Vec::new();
            }
        };

        let mut users = Vec::with_capacity(keys.len());
        for key in keys {
            let user_id = match key.rsplit(':').next().and_then(|s| Uuid::parse_str(s).ok()) {
                Some(id) => id,
                None => continue,
            };
            match self.cache.get(&key).await {
                // Key may expire between KEYS and GET; skip silently
                Ok(Some(display_name)) => users.push(TypingUser {
                    user_id,
                    display_name,
                }),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read typing flag");
                }
            }
        }
        users
    }

    pub async fn export_messages(
        &self,
        session_id: Uuid,
        format: ExportFormat,
        include_private: bool,
    ) -> AppResult<String> {
        self.store
            .export_messages(session_id, format, include_private)
            .await
    }

    pub async fn record_join(
        &self,
        session_id: Uuid,
        user: &SessionUser,
    ) -> AppResult<AttendanceRecord> {
        self.store.record_join(session_id, user).await
    }

    pub async fn record_leave(&self, attendance_id: Uuid) -> AppResult<()> {
        self.store.record_leave(attendance_id).await
    }
}

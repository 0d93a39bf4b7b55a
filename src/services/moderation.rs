//! Moderation engine: mute state machine, profanity filtering, auto-mute.
//!
//! Mute rows live in the document store; strike counters live in the shared
//! cache with a rolling window TTL. Expiry of a timed mute is lazy — the next
//! mute check deactivates the row as a side effect, no background sweep.

use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CacheClient;
use crate::config::ChatLimits;
use crate::error::{AppError, AppResult};
use crate::models::{MuteRecord, SessionUser};
use crate::store::{FindQuery, ZeroDbClient};

pub const COL_MUTES: &str = "chat_mutes";

const AUTO_MUTE_REASON: &str = "automatic mute after repeated profanity";

/// Case-insensitive whole-word profanity filter.
///
/// Each hit is replaced by asterisks of the same length, so redaction never
/// empties the text.
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    terms: HashSet<String>,
}

impl ProfanityFilter {
    pub fn new(terms: &[String]) -> Self {
        Self {
            terms: terms.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Returns the filtered text and the number of masked terms.
    pub fn apply(&self, text: &str) -> (String, usize) {
        let mut out = String::with_capacity(text.len());
        let mut hits = 0;
        let mut word = String::new();

        fn flush(word: &mut String, out: &mut String, hits: &mut usize, terms: &HashSet<String>) {
            if !word.is_empty() {
                if terms.contains(&word.to_lowercase()) {
                    out.extend(std::iter::repeat('*').take(word.chars().count()));
                    *hits += 1;
                } else {
                    out.push_str(word);
                }
                word.clear();
            }
        }

        for ch in text.chars() {
            if ch.is_alphanumeric() || ch == '\'' {
                word.push(ch);
            } else {
                flush(&mut word, &mut out, &mut hits, &self.terms);
                out.push(ch);
            }
        }
        flush(&mut word, &mut out, &mut hits, &self.terms);

        (out, hits)
    }
}

/// Outcome of screening an outgoing message.
#[derive(Debug, Clone)]
pub struct ScreenedMessage {
    pub text: String,
    pub redacted: bool,
    /// Set when this message tripped the strike threshold and the sender was
    /// just auto-muted
    pub auto_mute: Option<MuteRecord>,
}

#[derive(Clone)]
pub struct ModerationService {
    db: ZeroDbClient,
    cache: CacheClient,
    limits: Arc<ChatLimits>,
    filter: ProfanityFilter,
}

impl ModerationService {
    pub fn new(db: ZeroDbClient, cache: CacheClient, limits: Arc<ChatLimits>) -> Self {
        let filter = ProfanityFilter::new(&limits.profanity_terms);
        Self {
            db,
            cache,
            limits,
            filter,
        }
    }

    fn strikes_key(session_id: Uuid, user_id: Uuid) -> String {
        format!("chat:strikes:{}:{}", session_id, user_id)
    }

    async fn active_mute_rows(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<MuteRecord>> {
        let query = FindQuery::filter(json!({
            "session_id": session_id,
            "user_id": user_id,
            "active": true,
        }))
        .sort_by("created_at", -1);
        Ok(self.db.find(COL_MUTES, &query).await?)
    }

    async fn deactivate(&self, row: &MuteRecord) -> AppResult<()> {
        self.db
            .update_one(
                COL_MUTES,
                row.id,
                json!({ "active": false, "unmuted_at": Utc::now() }),
            )
            .await?;
        Ok(())
    }

    /// Effective mute for (session, user), expiring stale rows on the way.
    pub async fn active_mute(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<MuteRecord>> {
        let now = Utc::now();
        let mut effective = None;

        for row in self.active_mute_rows(session_id, user_id).await? {
            if row.is_expired(now) {
                // Lazy expiry: flip the row off as a side effect of the check.
                if let Err(e) = self.deactivate(&row).await {
                    tracing::warn!(error = %e, mute_id = %row.id, "failed to deactivate expired mute");
                }
            } else if row.is_effective(now) && effective.is_none() {
                effective = Some(row);
            }
        }

        Ok(effective)
    }

    /// Instructor/admin mute. Overwrites any active mute for the target.
    pub async fn mute(
        &self,
        session_id: Uuid,
        target_user_id: Uuid,
        actor: &SessionUser,
        duration_minutes: Option<i64>,
        reason: Option<String>,
    ) -> AppResult<MuteRecord> {
        if !actor.role.is_privileged() {
            return Err(AppError::Forbidden);
        }
        self.insert_mute(
            session_id,
            target_user_id,
            Some(actor.user_id),
            duration_minutes,
            reason,
        )
        .await
    }

    /// Deactivate every currently-active mute row for the target. Returns the
    /// number of rows deactivated; calling again on an unmuted user is a
    /// no-op returning 0.
    pub async fn unmute(
        &self,
        session_id: Uuid,
        target_user_id: Uuid,
        actor: &SessionUser,
    ) -> AppResult<u32> {
        if !actor.role.is_privileged() {
            return Err(AppError::Forbidden);
        }

        let rows = self.active_mute_rows(session_id, target_user_id).await?;
        let mut deactivated = 0;
        for row in &rows {
            // Independent idempotent writes; the store has no multi-row
            // transactions.
            self.deactivate(row).await?;
            deactivated += 1;
        }
        Ok(deactivated)
    }

    async fn insert_mute(
        &self,
        session_id: Uuid,
        target_user_id: Uuid,
        muted_by: Option<Uuid>,
        duration_minutes: Option<i64>,
        reason: Option<String>,
    ) -> AppResult<MuteRecord> {
        // Overwrite semantics: retire existing active rows first.
        for row in self.active_mute_rows(session_id, target_user_id).await? {
            self.deactivate(&row).await?;
        }

        let now = Utc::now();
        let record = MuteRecord {
            id: Uuid::new_v4(),
            session_id,
            user_id: target_user_id,
            muted_by,
            reason,
            expires_at: duration_minutes.map(|m| now + Duration::minutes(m)),
            active: true,
            created_at: now,
            unmuted_at: None,
        };
        self.db.insert_one(COL_MUTES, &record).await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %target_user_id,
            expires_at = ?record.expires_at,
            automatic = muted_by.is_none(),
            "user muted"
        );
        Ok(record)
    }

    /// Scan an outgoing message, mask profanity, count strikes and auto-mute
    /// on the configured threshold. The message is never rejected here — at
    /// worst it goes out redacted with its sender freshly muted.
    pub async fn screen_message(
        &self,
        session_id: Uuid,
        sender: &SessionUser,
        text: &str,
    ) -> AppResult<ScreenedMessage> {
        let (filtered, hits) = self.filter.apply(text);
        if hits == 0 {
            return Ok(ScreenedMessage {
                text: filtered,
                redacted: false,
                auto_mute: None,
            });
        }

        let key = Self::strikes_key(session_id, sender.user_id);
        let strikes = match self
            .cache
            .incr_in_window(&key, self.limits.strike_window_secs)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "strike counter cache unavailable");
                0
            }
        };

        let auto_mute = if strikes >= self.limits.auto_mute_strikes as i64 {
            let record = self
                .insert_mute(
                    session_id,
                    sender.user_id,
                    None,
                    Some(self.limits.auto_mute_minutes),
                    Some(AUTO_MUTE_REASON.to_string()),
                )
                .await?;
            // Reset so the user starts from a clean slate after the mute.
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(error = %e, "failed to reset strike counter");
            }
            Some(record)
        } else {
            None
        };

        Ok(ScreenedMessage {
            text: filtered,
            redacted: true,
            auto_mute,
        })
    }
}

//! Fixed-window rate limiting over the shared cache.
//!
//! First action in a window sets the counter to 1 and arms the TTL; later
//! actions increment. Counts live only in the cache, so limits hold across
//! service instances. If the cache is unreachable the limiter fails OPEN —
//! availability over strict enforcement — and logs a warning.

use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CacheClient;
use crate::config::ChatLimits;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    Message,
    Reaction,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Reaction => "reaction",
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheClient,
    limits: Arc<ChatLimits>,
}

impl RateLimiter {
    pub fn new(cache: CacheClient, limits: Arc<ChatLimits>) -> Self {
        Self { cache, limits }
    }

    fn window_for(&self, action: RateLimitAction) -> (u32, u64) {
        match action {
            RateLimitAction::Message => {
                (self.limits.message_limit, self.limits.message_window_secs)
            }
            RateLimitAction::Reaction => {
                (self.limits.reaction_limit, self.limits.reaction_window_secs)
            }
        }
    }

    pub fn key(session_id: Uuid, user_id: Uuid, action: RateLimitAction) -> String {
        format!("chat:rl:{}:{}:{}", action.as_str(), session_id, user_id)
    }

    /// Consume one unit of quota, or fail with `RateLimited`.
    ///
    /// `bypass` (privileged roles) always succeeds without touching the
    /// counter. Racing increments across instances can overshoot the limit
    /// slightly; the cache's atomic INCR keeps that bounded and acceptable.
    pub async fn check(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: RateLimitAction,
        bypass: bool,
    ) -> AppResult<()> {
        if bypass {
            return Ok(());
        }

        let (limit, window_secs) = self.window_for(action);
        let key = Self::key(session_id, user_id, action);

        match self.cache.incr_in_window(&key, window_secs).await {
            Ok(count) if count > limit as i64 => Err(AppError::RateLimited {
                action: action.as_str(),
                retry_after_secs: window_secs,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "rate limit cache unavailable, allowing action");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();
        let key = RateLimiter::key(session, user, RateLimitAction::Message);
        assert_eq!(key, format!("chat:rl:message:{}:{}", session, user));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(RateLimitAction::Message.as_str(), "message");
        assert_eq!(RateLimitAction::Reaction.as_str(), "reaction");
    }

    #[tokio::test]
    async fn test_fails_open_when_cache_unreachable() {
        // Nothing listens on this port; every cache op errors and the
        // limiter must allow the action anyway.
        let cache = CacheClient::new("redis://127.0.0.1:1/").unwrap();
        let limiter = RateLimiter::new(cache, Arc::new(ChatLimits::default()));

        for _ in 0..20 {
            limiter
                .check(
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    RateLimitAction::Message,
                    false,
                )
                .await
                .expect("limiter must fail open");
        }
    }

    #[tokio::test]
    async fn test_bypass_never_touches_cache() {
        let cache = CacheClient::new("redis://127.0.0.1:1/").unwrap();
        let limiter = RateLimiter::new(cache, Arc::new(ChatLimits::default()));
        limiter
            .check(
                Uuid::new_v4(),
                Uuid::new_v4(),
                RateLimitAction::Reaction,
                true,
            )
            .await
            .expect("bypass always succeeds");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mute row in the `chat_mutes` collection.
///
/// "Currently effective" is derived, never stored: a mute counts only while
/// `active` and not past its expiry. Expired rows are deactivated lazily by
/// the next mute check that touches them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    /// `None` marks an automatic mute issued by the moderation engine
    #[serde(default)]
    pub muted_by: Option<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Absent = permanent
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub unmuted_at: Option<DateTime<Utc>>,
}

impl MuteRecord {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |exp| now < exp)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(false, |exp| now >= exp)
    }
}

/// Raised-hand row in the `raised_hands` collection.
///
/// At most one active row exists per (session, user); raising again while
/// active returns the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaisedHand {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub active: bool,
    pub raised_at: DateTime<Utc>,
    #[serde(default)]
    pub lowered_at: Option<DateTime<Utc>>,
    /// Instructor who acknowledged the hand, when lowered by one
    #[serde(default)]
    pub acknowledged_by: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mute(expires_at: Option<DateTime<Utc>>, active: bool) -> MuteRecord {
        MuteRecord {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            muted_by: None,
            reason: None,
            expires_at,
            active,
            created_at: Utc::now(),
            unmuted_at: None,
        }
    }

    #[test]
    fn test_permanent_mute_is_effective() {
        let now = Utc::now();
        assert!(mute(None, true).is_effective(now));
        assert!(!mute(None, true).is_expired(now));
    }

    #[test]
    fn test_expired_mute_is_not_effective() {
        let now = Utc::now();
        let past = mute(Some(now - Duration::minutes(1)), true);
        assert!(!past.is_effective(now));
        assert!(past.is_expired(now));
    }

    #[test]
    fn test_inactive_mute_is_neither_effective_nor_expired() {
        let now = Utc::now();
        let row = mute(Some(now + Duration::minutes(5)), false);
        assert!(!row.is_effective(now));
        assert!(!row.is_expired(now));
    }
}

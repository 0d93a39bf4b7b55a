use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Live session master record (`sessions` collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub name: String,
    pub scheduled_start: DateTime<Utc>,
    /// Recording id at the video analytics provider, once a VOD exists
    #[serde(default)]
    pub vod_video_id: Option<String>,
}

/// One join/leave span of one attendee (`attendance` collection).
///
/// Duration and on-time-ness are computed from the timestamps, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub left_at: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub fn duration_minutes(&self) -> Option<f64> {
        self.left_at
            .map(|left| (left - self.joined_at).num_seconds().max(0) as f64 / 60.0)
    }
}

/// Sign-up row (`registrations` collection); the attendance CSV is keyed off
/// these so registered-but-absent members still show up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub email: String,
}

/// Post-session rating (`session_feedback` collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFeedback {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    /// 1-5
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Per-user VOD consumption (`vod_views` collection), synced in from the
/// video provider's webhooks by a separate job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VodView {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub watched: bool,
    #[serde(default)]
    pub watch_time_minutes: f64,
    #[serde(default)]
    pub completion_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_minutes() {
        let joined = Utc::now();
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "A".into(),
            joined_at: joined,
            left_at: Some(joined + Duration::minutes(42)),
        };
        assert_eq!(record.duration_minutes(), Some(42.0));
    }

    #[test]
    fn test_open_record_has_no_duration() {
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "A".into(),
            joined_at: Utc::now(),
            left_at: None,
        };
        assert_eq!(record.duration_minutes(), None);
    }
}

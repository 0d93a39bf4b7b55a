//! Session analytics: pure read-side computations over persisted attendance,
//! chat, reaction and feedback records. Never mutates anything and never sits
//! on the live message path.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ChatLimits;
use crate::error::{AppError, AppResult};
use crate::models::{
    AttendanceRecord, ChatMessage, ChatReaction, ReactionKind, Registration, SessionFeedback,
    SessionRecord, VodView,
};
use crate::services::chat_store::{csv_field, COL_ATTENDANCE, COL_MESSAGES, COL_REACTIONS};
use crate::services::vod_metrics::{VodMetricsClient, VodViewMetrics};
use crate::store::{FindQuery, ZeroDbClient};

pub const COL_SESSIONS: &str = "sessions";
pub const COL_REGISTRATIONS: &str = "registrations";
pub const COL_FEEDBACK: &str = "session_feedback";
pub const COL_VOD_VIEWS: &str = "vod_views";

/// Timeline charts are capped at this many points; longer series are
/// down-sampled by fixed stride.
const MAX_TIMELINE_POINTS: usize = 100;

const MIN_COMPARE_SESSIONS: usize = 2;
const MAX_COMPARE_SESSIONS: usize = 10;

/// Band around "no change" that still classifies as stable.
const TREND_STABLE_BAND: f64 = 0.10;

// ---------------------------------------------------------------------------
// Report structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total_registered: usize,
    pub total_attended: usize,
    /// attended / registered * 100; defined as 0 when nobody registered
    pub attendance_rate: f64,
    pub on_time: usize,
    pub late: usize,
    pub average_duration_minutes: f64,
    pub total_duration_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub message_count: usize,
    pub unique_chatters: usize,
    /// Heuristic: messages whose text ends with '?'
    pub question_count: usize,
    pub reaction_count: usize,
    pub reactions_by_kind: HashMap<ReactionKind, u32>,
    /// |chatters ∪ reactors| / attended * 100
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyPoint {
    pub timestamp: DateTime<Utc>,
    pub concurrent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakConcurrency {
    pub peak: i64,
    pub peak_at: Option<DateTime<Utc>>,
    pub timeline: Vec<ConcurrencyPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementScore {
    /// Weighted total, clamped to [0, 100]
    pub score: f64,
    pub attendance_rate: f64,
    pub engagement_rate: f64,
    pub chat_score: f64,
    pub retention_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub session_name: String,
    pub scheduled_start: DateTime<Utc>,
    pub attendance: AttendanceStats,
    pub engagement: EngagementMetrics,
    pub concurrency: PeakConcurrency,
    pub score: EngagementScore,
    pub average_rating: Option<f64>,
    pub vod: VodViewMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub session_name: String,
    pub scheduled_start: DateTime<Utc>,
    pub attendance_rate: f64,
    pub engagement_rate: f64,
    pub engagement_score: f64,
    pub average_duration_minutes: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparativeAverages {
    pub attendance_rate: f64,
    pub engagement_rate: f64,
    pub engagement_score: f64,
    pub average_duration_minutes: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparativeReport {
    pub sessions: Vec<SessionSummary>,
    pub averages: ComparativeAverages,
    pub trends: HashMap<String, Trend>,
}

// ---------------------------------------------------------------------------
// Pure computations
// ---------------------------------------------------------------------------

pub fn attendance_stats(
    session: &SessionRecord,
    registrations: &[Registration],
    attendance: &[AttendanceRecord],
    on_time_window: Duration,
) -> AttendanceStats {
    let total_registered = registrations.len();

    // Earliest join per user decides on-time vs late
    let mut first_join: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    for record in attendance {
        first_join
            .entry(record.user_id)
            .and_modify(|t| {
                if record.joined_at < *t {
                    *t = record.joined_at;
                }
            })
            .or_insert(record.joined_at);
    }
    let total_attended = first_join.len();

    let cutoff = session.scheduled_start + on_time_window;
    let on_time = first_join.values().filter(|t| **t <= cutoff).count();
    let late = total_attended - on_time;

    // Open records (no leave timestamp) count as attended but contribute no
    // duration sample.
    let durations: Vec<f64> = attendance
        .iter()
        .filter_map(AttendanceRecord::duration_minutes)
        .collect();
    let total_duration_minutes: f64 = durations.iter().sum();
    let average_duration_minutes = if durations.is_empty() {
        0.0
    } else {
        total_duration_minutes / durations.len() as f64
    };

    let attendance_rate = if total_registered == 0 {
        0.0
    } else {
        total_attended as f64 / total_registered as f64 * 100.0
    };

    AttendanceStats {
        total_registered,
        total_attended,
        attendance_rate,
        on_time,
        late,
        average_duration_minutes,
        total_duration_minutes,
    }
}

pub fn engagement_metrics(
    messages: &[ChatMessage],
    reactions: &[ChatReaction],
    total_attended: usize,
) -> EngagementMetrics {
    let live: Vec<&ChatMessage> = messages.iter().filter(|m| !m.deleted).collect();

    let message_count = live.len();
    let chatters: HashSet<Uuid> = live.iter().map(|m| m.sender_id).collect();
    let question_count = live
        .iter()
        .filter(|m| m.text.trim().ends_with('?'))
        .count();

    let reactors: HashSet<Uuid> = reactions.iter().map(|r| r.user_id).collect();
    let mut reactions_by_kind: HashMap<ReactionKind, u32> = HashMap::new();
    for reaction in reactions {
        *reactions_by_kind.entry(reaction.kind).or_insert(0) += 1;
    }

    let engaged: HashSet<Uuid> = chatters.union(&reactors).copied().collect();
    let engagement_rate = if total_attended == 0 {
        0.0
    } else {
        engaged.len() as f64 / total_attended as f64 * 100.0
    };

    EngagementMetrics {
        message_count,
        unique_chatters: chatters.len(),
        question_count,
        reaction_count: reactions.len(),
        reactions_by_kind,
        engagement_rate,
    }
}

/// Reconstruct peak concurrency from the signed join/leave event stream.
///
/// Tie-break at equal timestamps: leaves are processed before joins, so a
/// back-to-back leave/join at the same instant does not inflate the peak.
pub fn peak_concurrency(attendance: &[AttendanceRecord]) -> PeakConcurrency {
    let mut events: Vec<(DateTime<Utc>, i64)> = Vec::with_capacity(attendance.len() * 2);
    for record in attendance {
        events.push((record.joined_at, 1));
        if let Some(left_at) = record.left_at {
            events.push((left_at, -1));
        }
    }
    // Sorting by (timestamp, delta) puts -1 before +1 at equal timestamps
    events.sort_by_key(|(t, delta)| (*t, *delta));

    let mut current = 0i64;
    let mut peak = 0i64;
    let mut peak_at = None;
    let mut timeline = Vec::with_capacity(events.len());

    for (timestamp, delta) in events {
        current += delta;
        timeline.push(ConcurrencyPoint {
            timestamp,
            concurrent: current,
        });
        if current > peak {
            peak = current;
            peak_at = Some(timestamp);
        }
    }

    PeakConcurrency {
        peak,
        peak_at,
        timeline: downsample(timeline, MAX_TIMELINE_POINTS),
    }
}

fn downsample(points: Vec<ConcurrencyPoint>, max_points: usize) -> Vec<ConcurrencyPoint> {
    if points.len() <= max_points {
        return points;
    }
    let stride = points.len().div_ceil(max_points);
    points
        .into_iter()
        .step_by(stride)
        .collect()
}

pub fn engagement_score(
    attendance: &AttendanceStats,
    engagement: &EngagementMetrics,
    peak: i64,
) -> EngagementScore {
    // Chat volume normalized against how long people actually stayed:
    // one message per six seconds of average attendance saturates it.
    let chat_score = if attendance.average_duration_minutes > 0.0 {
        (engagement.message_count as f64 / attendance.average_duration_minutes * 10.0).min(100.0)
    } else {
        0.0
    };

    let retention_score = if attendance.total_registered == 0 {
        0.0
    } else {
        (peak as f64 / attendance.total_registered as f64 * 100.0).min(100.0)
    };

    let score = attendance.attendance_rate * 0.30
        + engagement.engagement_rate * 0.40
        + chat_score * 0.15
        + retention_score * 0.15;

    EngagementScore {
        score: score.clamp(0.0, 100.0),
        attendance_rate: attendance.attendance_rate,
        engagement_rate: engagement.engagement_rate,
        chat_score,
        retention_score,
    }
}

/// Compare the mean of the earlier half of date-sorted values to the later
/// half; within ±10% counts as stable.
pub fn classify_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }
    let mid = values.len() / 2;
    let earlier: f64 = values[..mid].iter().sum::<f64>() / mid as f64;
    let later: f64 = values[mid..].iter().sum::<f64>() / (values.len() - mid) as f64;

    if earlier == 0.0 {
        return if later > 0.0 {
            Trend::Improving
        } else {
            Trend::Stable
        };
    }

    let change = (later - earlier) / earlier;
    if change > TREND_STABLE_BAND {
        Trend::Improving
    } else if change < -TREND_STABLE_BAND {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

struct SessionDataset {
    session: SessionRecord,
    registrations: Vec<Registration>,
    attendance: Vec<AttendanceRecord>,
    messages: Vec<ChatMessage>,
    reactions: Vec<ChatReaction>,
    feedback: Vec<SessionFeedback>,
}

pub struct SessionAnalyticsService {
    db: ZeroDbClient,
    vod: Option<VodMetricsClient>,
    limits: Arc<ChatLimits>,
}

impl SessionAnalyticsService {
    pub fn new(db: ZeroDbClient, vod: Option<VodMetricsClient>, limits: Arc<ChatLimits>) -> Self {
        Self { db, vod, limits }
    }

    fn on_time_window(&self) -> Duration {
        Duration::minutes(self.limits.on_time_window_minutes)
    }

    async fn by_session<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        session_id: Uuid,
        sort_field: Option<&str>,
    ) -> AppResult<Vec<T>> {
        let mut query = FindQuery::filter(json!({ "session_id": session_id }));
        if let Some(field) = sort_field {
            query = query.sort_by(field, 1);
        }
        Ok(self.db.find(collection, &query).await?)
    }

    async fn load_dataset(&self, session_id: Uuid) -> AppResult<SessionDataset> {
        let session: SessionRecord = self.db.find_by_id(COL_SESSIONS, session_id).await?;
        Ok(SessionDataset {
            session,
            registrations: self.by_session(COL_REGISTRATIONS, session_id, None).await?,
            attendance: self
                .by_session(COL_ATTENDANCE, session_id, Some("joined_at"))
                .await?,
            messages: self
                .by_session(COL_MESSAGES, session_id, Some("created_at"))
                .await?,
            reactions: self.by_session(COL_REACTIONS, session_id, None).await?,
            feedback: self.by_session(COL_FEEDBACK, session_id, None).await?,
        })
    }

    async fn vod_metrics(&self, session: &SessionRecord) -> VodViewMetrics {
        match (&self.vod, &session.vod_video_id) {
            // Provider failures never abort the report; the client itself
            // degrades to the unavailable placeholder.
            (Some(client), Some(video_id)) => client.view_metrics(video_id).await,
            _ => VodViewMetrics::unavailable(),
        }
    }

    fn build_report(dataset: &SessionDataset, on_time_window: Duration, vod: VodViewMetrics) -> SessionReport {
        let attendance = attendance_stats(
            &dataset.session,
            &dataset.registrations,
            &dataset.attendance,
            on_time_window,
        );
        let engagement =
            engagement_metrics(&dataset.messages, &dataset.reactions, attendance.total_attended);
        let concurrency = peak_concurrency(&dataset.attendance);
        let score = engagement_score(&attendance, &engagement, concurrency.peak);

        let average_rating = if dataset.feedback.is_empty() {
            None
        } else {
            Some(
                dataset.feedback.iter().map(|f| f.rating as f64).sum::<f64>()
                    / dataset.feedback.len() as f64,
            )
        };

        SessionReport {
            session_id: dataset.session.id,
            session_name: dataset.session.name.clone(),
            scheduled_start: dataset.session.scheduled_start,
            attendance,
            engagement,
            concurrency,
            score,
            average_rating,
            vod,
        }
    }

    pub async fn session_report(&self, session_id: Uuid) -> AppResult<SessionReport> {
        let dataset = self.load_dataset(session_id).await?;
        let vod = self.vod_metrics(&dataset.session).await;
        Ok(Self::build_report(&dataset, self.on_time_window(), vod))
    }

    /// Cross-session comparison. Accepts 2-10 session ids.
    pub async fn compare_sessions(&self, session_ids: &[Uuid]) -> AppResult<ComparativeReport> {
        if session_ids.len() < MIN_COMPARE_SESSIONS || session_ids.len() > MAX_COMPARE_SESSIONS {
            return Err(AppError::InvalidArgument(format!(
                "comparison requires between {MIN_COMPARE_SESSIONS} and {MAX_COMPARE_SESSIONS} sessions"
            )));
        }

        let mut summaries = Vec::with_capacity(session_ids.len());
        for &session_id in session_ids {
            let dataset = self.load_dataset(session_id).await?;
            let report =
                Self::build_report(&dataset, self.on_time_window(), VodViewMetrics::unavailable());
            summaries.push(SessionSummary {
                session_id: report.session_id,
                session_name: report.session_name,
                scheduled_start: report.scheduled_start,
                attendance_rate: report.attendance.attendance_rate,
                engagement_rate: report.engagement.engagement_rate,
                engagement_score: report.score.score,
                average_duration_minutes: report.attendance.average_duration_minutes,
            });
        }

        summaries.sort_by_key(|s| s.scheduled_start);

        let n = summaries.len() as f64;
        let averages = ComparativeAverages {
            attendance_rate: summaries.iter().map(|s| s.attendance_rate).sum::<f64>() / n,
            engagement_rate: summaries.iter().map(|s| s.engagement_rate).sum::<f64>() / n,
            engagement_score: summaries.iter().map(|s| s.engagement_score).sum::<f64>() / n,
            average_duration_minutes: summaries
                .iter()
                .map(|s| s.average_duration_minutes)
                .sum::<f64>()
                / n,
        };

        let mut trends = HashMap::new();
        trends.insert(
            "attendance_rate".to_string(),
            classify_trend(&summaries.iter().map(|s| s.attendance_rate).collect::<Vec<_>>()),
        );
        trends.insert(
            "engagement_rate".to_string(),
            classify_trend(&summaries.iter().map(|s| s.engagement_rate).collect::<Vec<_>>()),
        );
        trends.insert(
            "engagement_score".to_string(),
            classify_trend(&summaries.iter().map(|s| s.engagement_score).collect::<Vec<_>>()),
        );
        trends.insert(
            "average_duration_minutes".to_string(),
            classify_trend(
                &summaries
                    .iter()
                    .map(|s| s.average_duration_minutes)
                    .collect::<Vec<_>>(),
            ),
        );

        Ok(ComparativeReport {
            sessions: summaries,
            averages,
            trends,
        })
    }

    /// Attendance/engagement/feedback CSV. UTF-8 with a BOM so spreadsheet
    /// apps pick up the encoding.
    pub async fn attendance_csv(&self, session_id: Uuid) -> AppResult<String> {
        let dataset = self.load_dataset(session_id).await?;
        let vod_views: Vec<VodView> = self.by_session(COL_VOD_VIEWS, session_id, None).await?;
        Ok(render_attendance_csv(&dataset, &vod_views))
    }
}

const CSV_HEADER: &str = "Session Name,Attendee Name,Email,User ID,Joined At,Left At,\
Duration (min),Status,Messages Sent,Reactions Given,Questions Asked,\
Watched VOD,VOD Watch Time (min),VOD Completion %,Rating,Feedback";

fn render_attendance_csv(dataset: &SessionDataset, vod_views: &[VodView]) -> String {
    let mut per_user_messages: HashMap<Uuid, (usize, usize)> = HashMap::new();
    for message in dataset.messages.iter().filter(|m| !m.deleted) {
        let entry = per_user_messages.entry(message.sender_id).or_insert((0, 0));
        entry.0 += 1;
        if message.text.trim().ends_with('?') {
            entry.1 += 1;
        }
    }
    let mut per_user_reactions: HashMap<Uuid, usize> = HashMap::new();
    for reaction in &dataset.reactions {
        *per_user_reactions.entry(reaction.user_id).or_insert(0) += 1;
    }
    let feedback_by_user: HashMap<Uuid, &SessionFeedback> = dataset
        .feedback
        .iter()
        .map(|f| (f.user_id, f))
        .collect();
    let vod_by_user: HashMap<Uuid, &VodView> =
        vod_views.iter().map(|v| (v.user_id, v)).collect();

    // Per-user attendance rollup: earliest join, latest leave, summed duration
    struct Rollup {
        joined_at: DateTime<Utc>,
        left_at: Option<DateTime<Utc>>,
        duration_minutes: f64,
        user_name: String,
    }
    let mut rollups: HashMap<Uuid, Rollup> = HashMap::new();
    for record in &dataset.attendance {
        let duration = record.duration_minutes().unwrap_or(0.0);
        rollups
            .entry(record.user_id)
            .and_modify(|r| {
                if record.joined_at < r.joined_at {
                    r.joined_at = record.joined_at;
                }
                if record.left_at > r.left_at {
                    r.left_at = record.left_at;
                }
                r.duration_minutes += duration;
            })
            .or_insert(Rollup {
                joined_at: record.joined_at,
                left_at: record.left_at,
                duration_minutes: duration,
                user_name: record.user_name.clone(),
            });
    }

    // BOM keeps Excel from mangling non-ASCII attendee names
    let mut out = String::from("\u{feff}");
    out.push_str(CSV_HEADER);
    out.push('\n');

    let mut write_row = |user_id: Uuid, name: &str, email: &str| {
        let rollup = rollups.get(&user_id);
        let (messages, questions) = per_user_messages.get(&user_id).copied().unwrap_or((0, 0));
        let reactions = per_user_reactions.get(&user_id).copied().unwrap_or(0);
        let vod = vod_by_user.get(&user_id);
        let feedback = feedback_by_user.get(&user_id);

        let row = [
            csv_field(&dataset.session.name),
            csv_field(name),
            csv_field(email),
            user_id.to_string(),
            rollup
                .map(|r| r.joined_at.to_rfc3339())
                .unwrap_or_default(),
            rollup
                .and_then(|r| r.left_at)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            rollup
                .map(|r| format!("{:.1}", r.duration_minutes))
                .unwrap_or_default(),
            if rollup.is_some() { "Attended" } else { "Registered" }.to_string(),
            messages.to_string(),
            reactions.to_string(),
            questions.to_string(),
            if vod.map_or(false, |v| v.watched) { "Yes" } else { "No" }.to_string(),
            vod.map(|v| format!("{:.1}", v.watch_time_minutes))
                .unwrap_or_else(|| "0.0".to_string()),
            vod.map(|v| format!("{:.1}", v.completion_pct))
                .unwrap_or_else(|| "0.0".to_string()),
            feedback.map(|f| f.rating.to_string()).unwrap_or_default(),
            csv_field(feedback.and_then(|f| f.comment.as_deref()).unwrap_or("")),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    };

    let mut registered: Vec<&Registration> = dataset.registrations.iter().collect();
    registered.sort_by(|a, b| a.user_name.cmp(&b.user_name));
    let registered_ids: HashSet<Uuid> = registered.iter().map(|r| r.user_id).collect();

    for registration in registered {
        write_row(registration.user_id, &registration.user_name, &registration.email);
    }

    // Walk-ins: attendees who never registered still get a row (no email)
    let mut walk_ins: Vec<(&Uuid, &Rollup)> = rollups
        .iter()
        .filter(|(user_id, _)| !registered_ids.contains(*user_id))
        .collect();
    walk_ins.sort_by(|a, b| a.1.user_name.cmp(&b.1.user_name));
    for (user_id, rollup) in walk_ins {
        let name = rollup.user_name.clone();
        write_row(*user_id, &name, "");
    }

    out
}

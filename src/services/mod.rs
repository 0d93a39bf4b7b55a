pub mod analytics;
pub mod chat_service;
pub mod chat_store;
pub mod moderation;
pub mod rate_limiter;
pub mod vod_metrics;

// Re-export key types for convenience
pub use analytics::SessionAnalyticsService;
pub use chat_service::{SentMessage, SessionChatService, TypingUser};
pub use chat_store::{ChatStore, ExportFormat};
pub use moderation::{ModerationService, ProfanityFilter};
pub use rate_limiter::{RateLimitAction, RateLimiter};
pub use vod_metrics::{VodMetricsClient, VodViewMetrics};

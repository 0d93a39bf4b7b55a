// Re-export route modules
pub mod analytics;
pub mod messages;
pub mod sessions;
pub mod wsroute;

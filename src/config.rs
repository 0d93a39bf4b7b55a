use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

/// Tunables for the chat/moderation pipeline.
///
/// These used to live as module-level constants in an earlier iteration;
/// they are explicit configuration now so the rate limiter and moderation
/// engine receive them at construction instead of reaching for globals.
#[derive(Debug, Clone)]
pub struct ChatLimits {
    /// Max chat messages per user inside one fixed window
    pub message_limit: u32,
    pub message_window_secs: u64,
    /// Max reactions per user inside one fixed window
    pub reaction_limit: u32,
    pub reaction_window_secs: u64,
    /// Profanity strikes before an automatic mute
    pub auto_mute_strikes: u32,
    /// How long strikes are remembered
    pub strike_window_secs: u64,
    /// Duration of an automatic mute
    pub auto_mute_minutes: i64,
    /// TTL of a typing indicator flag
    pub typing_ttl_secs: u64,
    /// Joining within this window of the scheduled start counts as on time
    pub on_time_window_minutes: i64,
    /// Terms masked by the profanity filter (lowercase)
    pub profanity_terms: Vec<String>,
}

static DEFAULT_PROFANITY_TERMS: Lazy<Vec<String>> = Lazy::new(|| {
    ["damn", "hell", "crap", "bastard", "bloody", "screwed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            message_limit: 5,
            message_window_secs: 10,
            reaction_limit: 10,
            reaction_window_secs: 60,
            auto_mute_strikes: 3,
            strike_window_secs: 3600,
            auto_mute_minutes: 15,
            typing_ttl_secs: 5,
            on_time_window_minutes: 5,
            profanity_terms: DEFAULT_PROFANITY_TERMS.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VodProviderConfig {
    pub base_url: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_url: String,
    pub store_api_key: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub vod_provider: Option<VodProviderConfig>,
    pub limits: ChatLimits,
}

impl Config {
    fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
        env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();

        let store_url = env::var("STORE_URL")
            .map_err(|_| crate::error::AppError::Config("STORE_URL missing".into()))?;
        let store_api_key = env::var("STORE_API_KEY")
            .map_err(|_| crate::error::AppError::Config("STORE_API_KEY missing".into()))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = Self::parse_env("PORT", 3000);

        // VOD analytics provider is optional; without it reports carry the
        // documented "unavailable" placeholder.
        let vod_provider = match (env::var("VOD_API_URL"), env::var("VOD_API_TOKEN")) {
            (Ok(base_url), Ok(api_token)) => Some(VodProviderConfig {
                base_url,
                api_token,
            }),
            _ => None,
        };

        let defaults = ChatLimits::default();
        let profanity_terms = env::var("PROFANITY_TERMS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|terms| !terms.is_empty())
            .unwrap_or(defaults.profanity_terms);

        let limits = ChatLimits {
            message_limit: Self::parse_env("CHAT_MESSAGE_LIMIT", defaults.message_limit),
            message_window_secs: Self::parse_env(
                "CHAT_MESSAGE_WINDOW_SECS",
                defaults.message_window_secs,
            ),
            reaction_limit: Self::parse_env("CHAT_REACTION_LIMIT", defaults.reaction_limit),
            reaction_window_secs: Self::parse_env(
                "CHAT_REACTION_WINDOW_SECS",
                defaults.reaction_window_secs,
            ),
            auto_mute_strikes: Self::parse_env("CHAT_AUTO_MUTE_STRIKES", defaults.auto_mute_strikes),
            strike_window_secs: Self::parse_env(
                "CHAT_STRIKE_WINDOW_SECS",
                defaults.strike_window_secs,
            ),
            auto_mute_minutes: Self::parse_env("CHAT_AUTO_MUTE_MINUTES", defaults.auto_mute_minutes),
            typing_ttl_secs: Self::parse_env("CHAT_TYPING_TTL_SECS", defaults.typing_ttl_secs),
            on_time_window_minutes: Self::parse_env(
                "ON_TIME_WINDOW_MINUTES",
                defaults.on_time_window_minutes,
            ),
            profanity_terms,
        };

        Ok(Self {
            port,
            store_url,
            store_api_key,
            redis_url,
            jwt_secret,
            vod_provider,
            limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_limits_defaults() {
        let limits = ChatLimits::default();
        assert_eq!(limits.message_limit, 5);
        assert_eq!(limits.message_window_secs, 10);
        assert_eq!(limits.reaction_limit, 10);
        assert_eq!(limits.reaction_window_secs, 60);
        assert_eq!(limits.auto_mute_strikes, 3);
        assert_eq!(limits.auto_mute_minutes, 15);
        assert_eq!(limits.typing_ttl_secs, 5);
        assert_eq!(limits.on_time_window_minutes, 5);
        assert!(!limits.profanity_terms.is_empty());
    }

    #[test]
    fn test_default_profanity_terms_are_lowercase() {
        for term in DEFAULT_PROFANITY_TERMS.iter() {
            assert_eq!(*term, term.to_lowercase());
        }
    }
}

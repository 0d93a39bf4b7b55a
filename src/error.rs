use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rate limit exceeded for {action} (retry in {retry_after_secs}s)")]
    RateLimited {
        action: &'static str,
        retry_after_secs: u64,
    },

    #[error("sender is muted")]
    Muted {
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("external provider error: {0}")]
    Provider(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// HTTP status for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::Muted { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Store(_)
            | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to echo back to the acting user.
    ///
    /// Mute errors carry their reason/expiry so the sender learns why the
    /// action was refused; store/internal errors stay generic.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Muted { reason, expires_at } => {
                let mut msg = String::from("you are muted in this session");
                if let Some(reason) = reason {
                    msg.push_str(&format!(" ({reason})"));
                }
                if let Some(expires_at) = expires_at {
                    msg.push_str(&format!(", until {}", expires_at.to_rfc3339()));
                }
                msg
            }
            AppError::Store(_) | AppError::Internal | AppError::StartServer(_) => {
                "action failed".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.http_status())
            .json(serde_json::json!({ "error": self.user_message() }))
    }
}

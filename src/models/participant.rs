//! Session roles and connection identity.
//!
//! Roles have a natural ordering: Member < Instructor < Admin.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role of a participant inside a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Regular member - can chat, react and raise a hand
    Member = 0,
    /// Instructor - runs the session, may moderate
    Instructor = 1,
    /// Admin - platform staff, same powers as instructor
    Admin = 2,
}

impl SessionRole {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "instructor" => Some(Self::Instructor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Instructor => "instructor",
            Self::Admin => "admin",
        }
    }

    /// Privileged roles may delete messages, mute/unmute and bypass rate limits
    pub fn is_privileged(&self) -> bool {
        *self >= SessionRole::Instructor
    }
}

impl Default for SessionRole {
    fn default() -> Self {
        Self::Member
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_opt(s).ok_or_else(|| format!("invalid role: {}", s))
    }
}

/// Identity attached to one live connection.
///
/// Process-local only; rebuilt from token claims on every connect and never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: SessionRole,
}

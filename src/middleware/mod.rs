pub mod auth;

// Re-export for compatibility
pub use auth::{verify_jwt, AuthedUser, Claims};

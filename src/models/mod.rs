pub mod attendance;
pub mod message;
pub mod moderation;
pub mod participant;

pub use attendance::{AttendanceRecord, Registration, SessionFeedback, SessionRecord, VodView};
pub use message::{ChatMessage, ChatReaction, ReactionKind};
pub use moderation::{MuteRecord, RaisedHand};
pub use participant::{SessionRole, SessionUser};

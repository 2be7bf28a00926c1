//! # Trivia Notify
//!
//! Turns a new interaction on a prayer request into a notification for the
//! prayer's owner, then fans out to push and email when the owner's profile
//! allows it.
//!
//! The notification record is the primary effect. Push and email are best
//! effort: their failures are logged and reported, never returned.

pub mod notifier;
pub mod providers;
pub mod types;

use thiserror::Error;

pub use notifier::{ChannelOutcome, FanoutReport, InteractionNotifier};
pub use providers::{
    EmailSender, MemoryNotificationStore, MemoryProfileStore, NotificationStore, ProfileStore,
    PushReceipt, PushSender, RecordingEmailSender, RecordingPushSender,
};
pub use types::{
    EmailMessage, Interaction, InteractionKind, NotificationRecord, PrayerRequest, Profile,
    PushMessage,
};

/// Errors from notifier collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification store error: {0}")]
    Store(String),

    #[error("Profile lookup failed: {0}")]
    Profile(String),

    #[error("Push delivery failed: {0}")]
    Push(String),

    #[error("Email delivery failed: {0}")]
    Email(String),
}

//! Documents the notifier reads and writes.

use serde::{Deserialize, Serialize};
use trivia_core::Uid;

/// A prayer request owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerRequest {
    pub id: String,
    pub owner_uid: Uid,
    #[serde(default)]
    pub title: String,
}

/// What the actor did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Prayed,
    Comment,
    #[serde(other)]
    Other,
}

impl InteractionKind {
    fn verb(&self) -> &'static str {
        match self {
            Self::Prayed => "prayed for",
            Self::Comment => "commented on",
            Self::Other => "responded to",
        }
    }
}

/// A newly created entry under a prayer's interactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    pub actor_uid: Uid,
    pub actor_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub message: Option<String>,
}

impl Interaction {
    pub fn actor_label(&self) -> &str {
        self.actor_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Someone")
    }

    /// Notification title, e.g. "Ruth prayed for your request".
    pub fn headline(&self) -> String {
        format!("{} {} your request", self.actor_label(), self.kind.verb())
    }
}

/// In-app notification stored for the prayer owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub recipient_uid: Uid,
    pub actor_uid: Uid,
    pub prayer_id: String,
    pub interaction_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: i64,
}

/// Delivery settings on a user's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub push_enabled: bool,
    pub push_tokens: Vec<String>,
    pub email_enabled: bool,
    pub email: Option<String>,
}

impl Profile {
    pub fn wants_push(&self) -> bool {
        self.push_enabled && !self.push_tokens.is_empty()
    }

    /// The address to mail, when email is on and an address is set.
    pub fn email_address(&self) -> Option<&str> {
        if !self.email_enabled {
            return None;
        }
        self.email.as_deref().filter(|addr| !addr.trim().is_empty())
    }
}

/// Payload for a multicast push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub prayer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

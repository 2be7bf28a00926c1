//! Identity types shared by the leaderboard and notifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated user id, as issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(uid: &str) -> Self {
        Self(uid.to_string())
    }
}

/// A caller whose session was already verified upstream.
///
/// Only the uid is authoritative; the profile claims are copied onto
/// leaderboard records as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub uid: Uid,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl CallerIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Uid::new(uid),
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_profile(mut self, display_name: impl Into<String>, photo_url: Option<String>) -> Self {
        self.display_name = Some(display_name.into());
        self.photo_url = photo_url;
        self
    }
}

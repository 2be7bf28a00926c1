//! Collaborators the notifier talks to, plus in-memory versions.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use trivia_core::Uid;

use crate::types::{EmailMessage, NotificationRecord, Profile, PushMessage};
use crate::NotifyError;

/// Where in-app notifications are written.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Store a record and return its id.
    async fn create(&self, record: NotificationRecord) -> Result<String, NotifyError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, uid: &Uid) -> Result<Option<Profile>, NotifyError>;
}

/// Result of a multicast push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReceipt {
    pub success_count: usize,
    pub failure_count: usize,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<PushReceipt, NotifyError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Notification records kept in a vector.
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    records: Mutex<Vec<NotificationRecord>>,
    fail: bool,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, record: NotificationRecord) -> Result<String, NotifyError> {
        if self.fail {
            return Err(NotifyError::Store("notification store unavailable".to_string()));
        }

        let mut records = self.records.lock().await;
        records.push(record);
        Ok(format!("notification-{}", records.len()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<Uid, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, uid: Uid, profile: Profile) {
        self.profiles.lock().await.insert(uid, profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn profile(&self, uid: &Uid) -> Result<Option<Profile>, NotifyError> {
        Ok(self.profiles.lock().await.get(uid).cloned())
    }
}

/// Push sender that records what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingPushSender {
    sent: Mutex<Vec<(Vec<String>, PushMessage)>>,
    fail: bool,
}

impl RecordingPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn sent(&self) -> Vec<(Vec<String>, PushMessage)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<PushReceipt, NotifyError> {
        if self.fail {
            return Err(NotifyError::Push("push service unavailable".to_string()));
        }

        self.sent.lock().await.push((tokens.to_vec(), message.clone()));
        Ok(PushReceipt {
            success_count: tokens.len(),
            failure_count: 0,
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Email("mail relay refused connection".to_string()));
        }

        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
